//! Route modules for the gcompat host.
//!
//! A module contributes routes once at startup and reacts to configuration
//! reloads afterwards. [`ControlPlaneModule`] is the only module today: it
//! forwards management API calls to the control plane and aliases provider
//! routes onto the host's handlers.

pub mod auth;
pub mod control_plane;
pub mod handlers;
pub mod module;

pub use auth::{AuthContext, AuthError, AuthProvider, NoopAuth, StaticKeyAuth, require_auth};
pub use control_plane::{ControlPlaneModule, MANAGEMENT_GROUPS, MODULE_NAME};
pub use handlers::{AliasRequest, BaseHandlers, ClaudeHandlers, GeminiHandlers, OpenAiHandlers};
pub use module::{ModuleError, ModuleSet, RouteModule};
