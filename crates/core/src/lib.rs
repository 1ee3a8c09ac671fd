//! Nova Act core types.
//!
//! The `Act` state machine, its steps and metadata, the outward-facing
//! result and error taxonomy, and the pure failure classifier shared by
//! every dispatch path.

pub mod act;
pub mod backend;
pub mod classifier;
pub mod error;
pub mod metadata;
pub mod page;
pub mod result;
pub mod step;

pub use act::{Act, ActOutcome, ActRequest, ModelKnobs, DEFAULT_ACT_MAX_STEPS};
pub use backend::{Backend, BackendInfo};
pub use classifier::{
    classify_failure, client_failure, resolve_outcome, ClientErrorCode, NOVA_ACT_CLIENT,
    NOVA_ACT_SERVICE,
};
pub use error::{create_warning_box, ActError, ActErrorKind, ActFailure, ActStateError, ThrottleKind};
pub use metadata::ActMetadata;
pub use page::PageState;
pub use result::ActResult;
pub use step::{ModelInput, ModelOutput, Step};
