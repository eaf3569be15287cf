//! Environments attached to a billing policy

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, Diagnostics, Resource};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::Client;
use crate::api::ApiError;
use crate::provider_data::{client_error, ProviderHandle};
use crate::resources::{expect_state, imported, replace_if_changed};
use crate::schema::{required, schema, string_list};
use crate::values::{str_or_empty, string, string_list as strings_value, strings, StringList};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingPolicyEnvironmentState {
    pub billing_policy_id: Value<String>,
    pub environments: StringList,
}

/// Ids to add and to remove so that `current` becomes `desired`
pub fn reconcile(current: &[String], desired: &[String]) -> (Vec<String>, Vec<String>) {
    let current_set: HashSet<&String> = current.iter().collect();
    let desired_set: HashSet<&String> = desired.iter().collect();

    let mut to_add = Vec::new();
    for id in desired {
        if !current_set.contains(id) && !to_add.contains(id) {
            to_add.push(id.clone());
        }
    }
    let to_remove = current
        .iter()
        .filter(|id| !desired_set.contains(id))
        .cloned()
        .collect();
    (to_add, to_remove)
}

/// Attached ids in the planned order when they match the plan as a set
fn settle(planned: Vec<String>, actual: Vec<String>) -> Vec<String> {
    let planned_set: HashSet<&String> = planned.iter().collect();
    let actual_set: HashSet<&String> = actual.iter().collect();
    if planned_set == actual_set {
        planned
    } else {
        actual
    }
}

#[derive(Debug, Clone)]
pub struct BillingPolicyEnvironmentResource {
    handle: ProviderHandle,
}

impl BillingPolicyEnvironmentResource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }

    async fn apply(
        &self,
        client: &Client,
        policy_id: &str,
        desired: Vec<String>,
    ) -> Result<Vec<String>, ApiError> {
        let licensing = client.licensing();
        let current = licensing.environments(policy_id).await?;
        let (to_add, to_remove) = reconcile(&current, &desired);
        tracing::debug!(
            "Billing policy {}: adding {:?}, removing {:?}",
            policy_id,
            to_add,
            to_remove
        );

        licensing.remove_environments(policy_id, &to_remove).await?;
        licensing.add_environments(policy_id, &to_add).await?;

        let actual = licensing.environments(policy_id).await?;
        Ok(settle(desired, actual))
    }
}

#[async_trait]
impl Resource for BillingPolicyEnvironmentResource {
    type State<'a> = Value<BillingPolicyEnvironmentState>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Manages the set of environments billed through a billing policy",
            map! {
                "billing_policy_id" => required(
                    AttributeType::String,
                    "Billing policy id; changing it recreates the resource",
                ),
                "environments" => required(string_list(), "Ids of the environments linked to the policy"),
            },
        ))
    }

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: Self::State<'a>) -> Option<()> {
        Some(())
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let state = expect_state(diags, state)?;
        let client = self.handle.client(diags).await?;
        let policy_id = str_or_empty(&state.billing_policy_id);

        match client.licensing().environments(policy_id).await {
            Ok(actual) => {
                let environments = settle(strings(&state.environments), actual);
                Some((
                    Value::Value(BillingPolicyEnvironmentState {
                        environments: strings_value(environments),
                        ..state
                    }),
                    private_state,
                ))
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("Billing policy {} no longer exists, removing from state", policy_id);
                Some((Value::Null, private_state))
            }
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

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let state = Value::Value(BillingPolicyEnvironmentState {
            billing_policy_id: string(id.clone()),
            ..Default::default()
        });
        let read = self
            .read(diags, state, ValueEmpty::default(), ValueEmpty::default())
            .await;
        imported(diags, "billing policy", &id, read)
    }

    async fn plan_create<'a>(
        &self,
        _diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        Some((proposed_state, Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(
        Self::State<'a>,
        Self::PrivateState<'a>,
        Vec<tf_provider::AttributePath>,
    )> {
        let prior = expect_state(diags, prior_state)?;
        let state = expect_state(diags, proposed_state)?;
        let mut replace = Vec::new();
        replace_if_changed(
            &mut replace,
            "billing_policy_id",
            &prior.billing_policy_id,
            &state.billing_policy_id,
        );
        Some((Value::Value(state), prior_private_state, replace))
    }

    async fn plan_destroy<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::PrivateState<'a>> {
        Some(prior_private_state)
    }

    async fn create<'a>(
        &self,
        diags: &mut Diagnostics,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let plan = expect_state(diags, planned_state)?;
        let client = self.handle.client(diags).await?;
        let policy_id = str_or_empty(&plan.billing_policy_id).to_string();

        match self.apply(&client, &policy_id, strings(&plan.environments)).await {
            Ok(environments) => Some((
                Value::Value(BillingPolicyEnvironmentState {
                    environments: strings_value(environments),
                    ..plan
                }),
                private_state,
            )),
            Err(e) => {
                client_error(
                    diags,
                    format!("Failed to attach environments to billing policy '{}'", policy_id),
                    &e,
                );
                None
            }
        }
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        self.create(diags, planned_state, config_state, private_state, provider_meta_state)
            .await
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let state = expect_state(diags, state)?;
        let client = self.handle.client(diags).await?;
        let policy_id = str_or_empty(&state.billing_policy_id);

        match client
            .licensing()
            .remove_environments(policy_id, &strings(&state.environments))
            .await
        {
            Ok(()) => Some(()),
            Err(e) => {
                client_error(
                    diags,
                    format!("Failed to detach environments from billing policy '{}'", policy_id),
                    &e,
                );
                None
            }
        }
    }
}
