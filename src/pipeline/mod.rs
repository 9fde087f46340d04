//! Action pipeline: routines, dispatch, publishing and the per-tool session

pub mod dispatch;
pub mod publish;
pub mod routines;
pub mod session;

pub use dispatch::{Progress, Routines};
pub use publish::{suggest_filename, PublishedResult, ResultHandle, ResultStore};
pub use routines::{Payload, RoutineSettings, Toolkit};
pub use session::{ActionOutcome, PageSettings, PageStatus, ToolPage};
