//! JNI backed integrations with the Android framework: a [`HostFs`] that
//! queries the application `Context`, and `StrictMode` thread policy
//! relaxation for [`PolicyGate`](crate::policy::PolicyGate).

use std::path::PathBuf;

use jni::{
    objects::{GlobalRef, JObject, JValue},
    JNIEnv, JavaVM,
};

use crate::error::{InternalPathError, InternalResult, Result};
use crate::host::{HostFs, NOMINAL_DATABASE};
use crate::jni_utils;
use crate::paths::Suffix;

// android.content.Context.MODE_PRIVATE
const MODE_PRIVATE: i32 = 0;


/// A [`HostFs`] that asks the Android application `Context` for its
/// directories
#[derive(Debug)]
pub struct AndroidHost {
    jvm: JavaVM,
    app_context: GlobalRef,
}

impl AndroidHost {
    /// Creates a host for the current application, based on the `Context`
    /// published via `ndk_context` (normally the `Activity`). The
    /// application context is captured since it lives as long as the process.
    pub fn from_current_context() -> Result<Self> {
        Ok(Self::from_current_context_internal()?)
    }

    fn from_current_context_internal() -> InternalResult<Self> {
        let jvm = jni_utils::java_vm()?;
        let cx = jni_utils::android_context()?;
        let app_context = {
            let mut env = jvm.attach_current_thread()?;
            // Safety: ndk_context publishes a valid global reference to a Context
            let context = unsafe { JObject::from_raw(cx.context().cast()) };
            let app_context = env
                .with_local_frame::<_, _, jni::errors::Error>(4, |env| {
                    let app_context = env
                        .call_method(
                            &context,
                            "getApplicationContext",
                            "()Landroid/content/Context;",
                            &[],
                        )?
                        .l()?;
                    env.new_global_ref(app_context)
                })
                .map_err(|err| jni_utils::clear_and_map_exception_to_err(&mut env, err))?;
            app_context
        };
        if app_context.as_obj().is_null() {
            return Err(InternalPathError::NullResult("Context.getApplicationContext()"));
        }
        Ok(Self { jvm, app_context })
    }

    fn with_context<T>(
        &self,
        f: impl FnOnce(&mut JNIEnv<'_>, &JObject<'static>) -> jni::errors::Result<T>,
    ) -> InternalResult<T> {
        let mut env = self.jvm.attach_current_thread()?;
        let context = self.app_context.as_obj();
        env.with_local_frame::<_, _, jni::errors::Error>(8, |env| f(env, context))
            .map_err(|err| jni_utils::clear_and_map_exception_to_err(&mut env, err))
    }
}

impl HostFs for AndroidHost {
    fn private_data_dir(&self, suffix: &Suffix) -> Result<PathBuf> {
        let path = self.with_context(|env, context| {
            let name = env.new_string(suffix.as_str())?;
            let dir = env
                .call_method(
                    context,
                    "getDir",
                    "(Ljava/lang/String;I)Ljava/io/File;",
                    &[JValue::Object(&name), JValue::Int(MODE_PRIVATE)],
                )?
                .l()?;
            jni_utils::string_getter(env, &dir, "getPath")
        })?;
        match path {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(InternalPathError::NullResult("Context.getDir()").into()),
        }
    }

    fn database_parent_dir(&self) -> Result<PathBuf> {
        let path = self.with_context(|env, context| {
            let name = env.new_string(NOMINAL_DATABASE)?;
            let db = env
                .call_method(
                    context,
                    "getDatabasePath",
                    "(Ljava/lang/String;)Ljava/io/File;",
                    &[JValue::Object(&name)],
                )?
                .l()?;
            jni_utils::string_getter(env, &db, "getParent")
        })?;
        path.map(PathBuf::from)
            .ok_or_else(|| InternalPathError::NullResult("Context.getDatabasePath()").into())
    }

    fn cache_dir(&self) -> Result<Option<PathBuf>> {
        let path = self.with_context(|env, context| {
            let dir = env
                .call_method(context, "getCacheDir", "()Ljava/io/File;", &[])?
                .l()?;
            jni_utils::string_getter(env, &dir, "getPath")
        })?;
        Ok(path.map(PathBuf::from))
    }
}

/// The Java `StrictMode.ThreadPolicy` that was in effect before disk access
/// was permitted on this thread
#[derive(Debug)]
pub(crate) struct StrictModeGuard {
    jvm: JavaVM,
    saved: GlobalRef,
}

impl StrictModeGuard {
    pub(crate) fn relax() -> InternalResult<Self> {
        let jvm = jni_utils::java_vm()?;
        let saved = {
            let mut env = jvm.attach_current_thread()?;
            env.with_local_frame::<_, _, jni::errors::Error>(4, |env| {
                let saved = env
                    .call_static_method(
                        "android/os/StrictMode",
                        "allowThreadDiskReads",
                        "()Landroid/os/StrictMode$ThreadPolicy;",
                        &[],
                    )?
                    .l()?;
                env.call_static_method(
                    "android/os/StrictMode",
                    "allowThreadDiskWrites",
                    "()Landroid/os/StrictMode$ThreadPolicy;",
                    &[],
                )?;
                env.new_global_ref(saved)
            })
            .map_err(|err| jni_utils::clear_and_map_exception_to_err(&mut env, err))?
        };
        Ok(Self { jvm, saved })
    }

    pub(crate) fn restore(self) {
        let result = self
            .jvm
            .attach_current_thread()
            .map_err(InternalPathError::from)
            .and_then(|mut env| {
                env.call_static_method(
                    "android/os/StrictMode",
                    "setThreadPolicy",
                    "(Landroid/os/StrictMode$ThreadPolicy;)V",
                    &[JValue::Object(self.saved.as_obj())],
                )
                .map(|_| ())
                .map_err(|err| jni_utils::clear_and_map_exception_to_err(&mut env, err))
            });
        if let Err(err) = result {
            log::error!("Failed to restore StrictMode thread policy: {err}");
        }
    }
}
