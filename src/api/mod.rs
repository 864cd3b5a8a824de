//! Hub API client and wire types.

pub mod client;
pub mod types;

pub use client::{ApiClient, Endpoints};
pub use types::{
    BatchObject, LfsObjectRef, PartResult, PreuploadFile, PreuploadResult, UploadMode,
};
