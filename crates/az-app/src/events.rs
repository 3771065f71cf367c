use uuid::Uuid;
use crate::job::{JobState, ServerState};

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    StateChanged {
        job_id: Uuid,
        state: JobState,
    },
    Polled {
        job_id: Uuid,
        status: ServerState,
    },
    /// The service went back to pending after reporting started; the whole
    /// request is sent again.
    Resubmitting {
        job_id: Uuid,
        attempt: u32,
    },
}
