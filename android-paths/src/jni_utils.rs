//! The JNI calls we make in this crate are not part of a Java native method
//! implementation, so we can't assume there is a JNI local frame that will
//! unwind and free local references, and we can't leave exceptions pending
//! to get thrown when returning to Java.
//!
//! These utilities help us check + clear exceptions and map them into Rust Errors.

use jni::{
    objects::{JObject, JString},
    JNIEnv, JavaVM,
};

use crate::error::{InternalPathError, InternalResult};
use crate::prefetch::panic_message;

/// The `JavaVM` and `Context` published by the glue crate that loaded us.
///
/// `ndk_context::android_context()` panics if nothing was published (for
/// example in a plain native test binary), which is reported as an error
/// here instead.
pub(crate) fn android_context() -> InternalResult<ndk_context::AndroidContext> {
    std::panic::catch_unwind(ndk_context::android_context)
        .map_err(|payload| InternalPathError::NoAndroidContext(panic_message(payload.as_ref())))
}

/// The `JavaVM` of the running application, as published via `ndk_context`
pub(crate) fn java_vm() -> InternalResult<JavaVM> {
    let cx = android_context()?;
    // Safety: ndk_context only ever publishes a valid JavaVM pointer
    Ok(unsafe { JavaVM::from_raw(cx.vm().cast())? })
}

/// Use with `.map_err()` to map `jni::errors::Error::JavaException` into a
/// richer error based on the message of the pending `Throwable`.
///
/// This will also clear the exception
pub(crate) fn clear_and_map_exception_to_err(
    env: &mut JNIEnv<'_>,
    err: jni::errors::Error,
) -> InternalPathError {
    if matches!(err, jni::errors::Error::JavaException) {
        let result = env.with_local_frame::<_, _, InternalPathError>(5, |env| {
            let e = env.exception_occurred()?;
            if e.is_null() {
                return Ok(String::from("UNKNOWN (no pending exception)"));
            }
            env.exception_clear()?;

            let msg = env
                .call_method(&e, "getMessage", "()Ljava/lang/String;", &[])?
                .l()?;
            if msg.is_null() {
                let class = env.get_object_class(&e)?;
                let name = env
                    .call_method(&class, "getName", "()Ljava/lang/String;", &[])?
                    .l()?;
                return Ok(env.get_string(&JString::from(name))?.into());
            }
            let msg: String = env.get_string(&JString::from(msg))?.into();
            Ok(msg)
        });

        match result {
            Ok(msg) => InternalPathError::JniException(msg),
            Err(err) => InternalPathError::JniException(format!(
                "UNKNOWN (Failed to query Throwable: {err:?})"
            )),
        }
    } else {
        err.into()
    }
}

/// Calls a `()Ljava/lang/String;` getter (such as `File.getPath()`) on
/// `object`, returning `None` if either the object or the returned string is
/// null
pub(crate) fn string_getter(
    env: &mut JNIEnv<'_>,
    object: &JObject<'_>,
    getter: &str,
) -> jni::errors::Result<Option<String>> {
    if object.is_null() {
        return Ok(None);
    }
    let value = env
        .call_method(object, getter, "()Ljava/lang/String;", &[])?
        .l()?;
    if value.is_null() {
        return Ok(None);
    }
    let value: String = env.get_string(&JString::from(value))?.into();
    Ok(Some(value))
}
