//! Data types for the stowage object-storage client.
//!
//! This crate holds the plain, I/O-free types exchanged between the
//! multipart orchestrator in `stowage-core` and the `StorageClient`
//! implementations: protocol limits, upload sessions, part descriptors and
//! completion results, object listings, CORS rules, and the upload state
//! machine.

pub mod cors;
pub mod limits;
pub mod object;
pub mod state;
pub mod upload;

pub use cors::CorsRule;
pub use object::{
    BucketSummary, DeleteError, DeleteObjectsResult, ObjectIdentifier, ObjectPage, ObjectSummary,
    PutObjectResult,
};
pub use state::UploadState;
pub use upload::{
    CompletedPart, CompletedUpload, CompletionOrigin, CopyObjectResult, ListPartsPage,
    PartOrderError, PartSummary, UploadSession, validate_completed_parts,
};
