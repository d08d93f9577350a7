pub(crate) mod access;
pub(crate) mod error;
pub(crate) mod grading;
pub(crate) mod lifecycle;
pub(crate) mod results;
