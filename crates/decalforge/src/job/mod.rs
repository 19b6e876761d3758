//! Job records and the submission/status boundary types.

pub mod model;
pub mod request;

pub use model::{Job, JobPatch, JobPhase, JobStatus, NewJob};
pub use request::{
    GenerationRequest, StatusResponse, SubmitResponse, ANONYMOUS_USER, MAX_COLORS,
};
