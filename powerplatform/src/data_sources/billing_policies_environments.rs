//! Environments billed through a billing policy

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::provider_data::{client_error, ProviderHandle};
use crate::schema::{computed, required, schema, string_list};
use crate::values::{known_str, string_list as strings_value, StringList};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingPolicyEnvironmentsState {
    pub billing_policy_id: Value<String>,
    pub environments: StringList,
}

#[derive(Debug, Clone)]
pub struct BillingPoliciesEnvironmentsDataSource {
    handle: ProviderHandle,
}

impl BillingPoliciesEnvironmentsDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for BillingPoliciesEnvironmentsDataSource {
    type State<'a> = BillingPolicyEnvironmentsState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the ids of the environments linked to a billing policy",
            map! {
                "billing_policy_id" => required(AttributeType::String, "Billing policy id"),
                "environments" => computed(string_list(), "Environment ids"),
            },
        ))
    }

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: Self::State<'a>) -> Option<()> {
        Some(())
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let client = self.handle.client(diags).await?;
        let policy_id = known_str(&config.billing_policy_id).unwrap_or_default();
        match client.licensing().environments(policy_id).await {
            Ok(environments) => Some(BillingPolicyEnvironmentsState {
                environments: strings_value(environments),
                ..config
            }),
            Err(e) => {
                client_error(
                    diags,
                    format!("Failed to read environments of billing policy '{}'", policy_id),
                    &e,
                );
                None
            }
        }
    }
}
