//! Resource implementations
//!
//! Every resource state is wrapped in a `Value` so that `read` can answer
//! `Value::Null` when the remote object is gone and Terraform drops it.

pub mod billing_policy;
pub mod billing_policy_environment;
pub mod environment;
pub mod environment_group;
pub mod environment_settings;
pub mod managed_environment;
pub mod tenant_settings;

pub use billing_policy::BillingPolicyResource;
pub use billing_policy_environment::BillingPolicyEnvironmentResource;
pub use environment::EnvironmentResource;
pub use environment_group::EnvironmentGroupResource;
pub use environment_settings::EnvironmentSettingsResource;
pub use managed_environment::ManagedEnvironmentResource;
pub use tenant_settings::TenantSettingsResource;

use tf_provider::{AttributePath, Diagnostics};
use tf_provider::value::{Value, ValueEmpty};

/// The object inside a state Terraform always sends as known
pub fn expect_state<T>(diags: &mut Diagnostics, state: Value<T>) -> Option<T> {
    match state {
        Value::Value(state) => Some(state),
        Value::Null => {
            diags.root_error("Invalid state", "Unexpected null resource state");
            None
        }
        Value::Unknown => {
            diags.root_error("Invalid state", "Unexpected unknown resource state");
            None
        }
    }
}

/// Outcome of an import that reads the object through the resource's `read`
///
/// A read that drops the object means there is nothing to import.
pub fn imported<T>(
    diags: &mut Diagnostics,
    kind: &str,
    id: &str,
    read: Option<(Value<T>, ValueEmpty)>,
) -> Option<(Value<T>, ValueEmpty)> {
    match read? {
        (Value::Value(state), private_state) => Some((Value::Value(state), private_state)),
        _ => {
            diags.root_error(
                format!("Cannot import non-existent {}", kind),
                format!("No {} with id '{}' was found", kind, id),
            );
            None
        }
    }
}

/// Record `name` as requiring replacement when the value changes
pub fn replace_if_changed<T: PartialEq>(
    replace: &mut Vec<AttributePath>,
    name: &str,
    prior: &Value<T>,
    proposed: &Value<T>,
) {
    if prior != proposed {
        replace.push(AttributePath::new(name.to_string()));
    }
}
