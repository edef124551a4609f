pub mod config;
pub mod credential;
pub mod error;
pub mod identity;
pub mod io;
pub mod paths;
pub mod policy;
pub mod settings;
pub mod store;
pub mod ttl;

pub use credential::AccessToken;
pub use error::{PolicyError, Result};
pub use identity::StackIdentity;
pub use policy::{DriftMode, FieldPolicies, FieldUpdatePolicy, LifecyclePolicy, StackSettingsArgs, Trigger};
pub use settings::{DeploymentSettings, DeploymentSourceSettings, RemoteSnapshot};
pub use store::{MemoryPolicyStore, PolicyStore, ReconcileLedger, RedbPolicyStore};
