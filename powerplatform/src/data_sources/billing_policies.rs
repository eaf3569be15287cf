//! Billing policies of the tenant

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::provider_data::{client_error, ProviderHandle};
use crate::resources::billing_policy::{billing_policy_object_type, BillingPolicyState};
use crate::schema::{computed, schema};
use crate::values::list;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingPoliciesState {
    pub billing_policies: Value<Vec<Value<BillingPolicyState>>>,
}

#[derive(Debug, Clone)]
pub struct BillingPoliciesDataSource {
    handle: ProviderHandle,
}

impl BillingPoliciesDataSource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl DataSource for BillingPoliciesDataSource {
    type State<'a> = BillingPoliciesState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Fetches the list of billing policies of the tenant",
            map! {
                "billing_policies" => computed(
                    AttributeType::List(billing_policy_object_type().into()),
                    "List of billing policies",
                ),
            },
        ))
    }

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: Self::State<'a>) -> Option<()> {
        Some(())
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        _config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let client = self.handle.client(diags).await?;
        match client.licensing().list().await {
            Ok(policies) => Some(BillingPoliciesState {
                billing_policies: list(policies.into_iter().map(BillingPolicyState::from)),
            }),
            Err(e) => {
                client_error(diags, "Failed to read billing policies", &e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use crate::values::{items, string};
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn read_lists_policies() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/licensing/billingPolicies")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"value": [{"id": "p1", "name": "one", "location": "europe", "status": "Enabled",
                    "billingInstrument": {"id": "i1", "resourceGroup": "rg", "subscriptionId": "sub"}}]}"#,
            )
            .create_async()
            .await;

        let data_source = BillingPoliciesDataSource::new(ProviderHandle::configured(
            create_test_client(&server.url()),
        ));
        let mut diags = Diagnostics::default();
        let state = data_source
            .read(&mut diags, BillingPoliciesState::default(), ValueEmpty::default())
            .await
            .unwrap();

        let policies = items(&state.billing_policies);
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].billing_instrument_id, string("i1"));
    }
}
