use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Host rejected a directory lookup: {0}")]
    HostUnavailable(String),

    #[error("Invalid private data directory suffix {0:?}")]
    InvalidSuffix(String),

    #[error("Background directory prefetch failed: {0}")]
    PrefetchFailed(String),

    #[error("Host panicked during a directory lookup: {0}")]
    HostPanicked(String),
}

pub type Result<T> = std::result::Result<T, PathError>;

// XXX: as with the rest of the public API we don't want to expose jni-rs
// types via `PathError`, so the JNI backed host uses an internal error type
// that gets flattened into a `PathError::HostUnavailable` at the boundary.
#[cfg(target_os = "android")]
#[derive(Error, Debug)]
pub(crate) enum InternalPathError {
    #[error("A JNI error")]
    JniError(jni::errors::JniError),
    #[error("A Java Exception was thrown via a JNI method call")]
    JniException(String),
    #[error("A Java VM error")]
    JvmError(jni::errors::Error),
    #[error("Unexpected null returned from {0}")]
    NullResult(&'static str),
    #[error("No Android context available: {0}")]
    NoAndroidContext(String),
}

#[cfg(target_os = "android")]
pub(crate) type InternalResult<T> = std::result::Result<T, InternalPathError>;

#[cfg(target_os = "android")]
impl From<jni::errors::Error> for InternalPathError {
    fn from(value: jni::errors::Error) -> Self {
        InternalPathError::JvmError(value)
    }
}

#[cfg(target_os = "android")]
impl From<jni::errors::JniError> for InternalPathError {
    fn from(value: jni::errors::JniError) -> Self {
        InternalPathError::JniError(value)
    }
}

#[cfg(target_os = "android")]
impl From<InternalPathError> for PathError {
    fn from(value: InternalPathError) -> Self {
        match value {
            InternalPathError::JniError(err) => PathError::HostUnavailable(err.to_string()),
            InternalPathError::JniException(msg) => PathError::HostUnavailable(msg),
            InternalPathError::JvmError(err) => PathError::HostUnavailable(err.to_string()),
            InternalPathError::NullResult(what) => {
                PathError::HostUnavailable(format!("{what} returned null"))
            }
            InternalPathError::NoAndroidContext(msg) => {
                PathError::HostUnavailable(format!("no Android context: {msg}"))
            }
        }
    }
}

impl From<std::io::Error> for PathError {
    fn from(value: std::io::Error) -> Self {
        PathError::HostUnavailable(value.to_string())
    }
}
