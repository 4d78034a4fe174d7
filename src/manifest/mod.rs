//! Manifest tracking and reproducibility verification
//!
//! Records which concrete files back the inputs, restarts and executable of
//! a run, and checks that a reproduce run sees identical files:
//! - `store` holds records keyed by logical path
//! - `persistence` reads and writes the YAML manifest files
//! - `verify` runs the fast → full hash escalation
//! - `materialize` links or copies records into the work directory
//! - `group` sequences the three manifests of a run

mod group;
pub mod materialize;
pub mod persistence;
mod store;
pub mod verify;

pub use group::{GroupState, ManifestGroup};
pub use materialize::{make_links, MaterializeReport};
pub use persistence::{ManifestDocument, ManifestHeader, StorageBackend, YamlFile};
pub use store::{AddOutcome, IgnoreReason, ManifestStore};
pub use verify::{check_fast, CheckReport};
