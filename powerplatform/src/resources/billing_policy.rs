//! Pay-as-you-go billing policy resource

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::licensing::{
    BillingInstrumentDto, BillingPolicyCreateDto, BillingPolicyDto, BillingPolicyUpdateDto,
    BILLING_POLICY_DISABLED, BILLING_POLICY_ENABLED,
};
use crate::provider_data::{client_error, ProviderHandle};
use crate::resources::{expect_state, imported, replace_if_changed};
use crate::schema::{computed, optional_computed, required, schema};
use crate::values::{is_unknown, known, known_str, str_or_empty, string};

const MAX_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingPolicyState {
    pub id: Value<String>,
    pub name: Value<String>,
    pub location: Value<String>,
    pub status: Value<String>,
    pub billing_instrument: Value<BillingInstrumentState>,
    pub billing_instrument_id: Value<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingInstrumentState {
    pub resource_group: Value<String>,
    pub subscription_id: Value<String>,
}

impl From<BillingPolicyDto> for BillingPolicyState {
    fn from(policy: BillingPolicyDto) -> Self {
        Self {
            id: string(policy.id),
            name: string(policy.name),
            location: string(policy.location),
            status: string(policy.status),
            billing_instrument: Value::Value(BillingInstrumentState {
                resource_group: string(policy.billing_instrument.resource_group),
                subscription_id: string(policy.billing_instrument.subscription_id),
            }),
            billing_instrument_id: string(policy.billing_instrument.id),
        }
    }
}

/// Object type of a billing policy, shared with the billing policies data source
pub fn billing_policy_object_type() -> AttributeType {
    AttributeType::Object(map! {
        "id" => AttributeType::String,
        "name" => AttributeType::String,
        "location" => AttributeType::String,
        "status" => AttributeType::String,
        "billing_instrument" => billing_instrument_type(),
        "billing_instrument_id" => AttributeType::String,
    })
}

fn billing_instrument_type() -> AttributeType {
    AttributeType::Object(map! {
        "resource_group" => AttributeType::String,
        "subscription_id" => AttributeType::String,
    })
}

fn validate_name(diags: &mut Diagnostics, name: &str) {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if name.is_empty() || name.len() > MAX_NAME_LENGTH || !valid_chars {
        diags.error(
            "Invalid billing policy name",
            format!(
                "'{}' must be 1 to {} characters of letters, digits, '-' or '_'",
                name, MAX_NAME_LENGTH
            ),
            AttributePath::new("name"),
        );
    }
}

#[derive(Debug, Clone)]
pub struct BillingPolicyResource {
    handle: ProviderHandle,
}

impl BillingPolicyResource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Resource for BillingPolicyResource {
    type State<'a> = Value<BillingPolicyState>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Manages a pay-as-you-go billing policy linked to an Azure subscription",
            map! {
                "id" => computed(AttributeType::String, "Billing policy id"),
                "name" => required(AttributeType::String, "Name of the billing policy"),
                "location" => required(
                    AttributeType::String,
                    "Power Platform location of the billing policy; changing it recreates the policy",
                ),
                "status" => optional_computed(AttributeType::String, "`Enabled` or `Disabled`"),
                "billing_instrument" => required(
                    billing_instrument_type(),
                    "Azure resource group and subscription charged by the policy; changing it recreates the policy",
                ),
                "billing_instrument_id" => computed(AttributeType::String, "Billing instrument id"),
            },
        ))
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        let Value::Value(config) = config else {
            return Some(());
        };
        if let Value::Value(name) = &config.name {
            validate_name(diags, name);
        }
        if let Value::Value(status) = &config.status {
            if status != BILLING_POLICY_ENABLED && status != BILLING_POLICY_DISABLED {
                diags.error(
                    "Invalid status",
                    format!(
                        "status must be '{}' or '{}', got '{}'",
                        BILLING_POLICY_ENABLED, BILLING_POLICY_DISABLED, status
                    ),
                    AttributePath::new("status"),
                );
            }
        }
        if let Value::Value(instrument) = &config.billing_instrument {
            for (name, value) in [
                ("resource_group", &instrument.resource_group),
                ("subscription_id", &instrument.subscription_id),
            ] {
                if matches!(value, Value::Value(v) if v.is_empty()) || matches!(value, Value::Null) {
                    diags.error(
                        "Invalid billing instrument",
                        format!("{} must be set", name),
                        AttributePath::new("billing_instrument"),
                    );
                }
            }
        }
        diags.errors.is_empty().then_some(())
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
        let id = str_or_empty(&state.id);

        match client.licensing().get(id).await {
            Ok(policy) => Some((Value::Value(policy.into()), private_state)),
            Err(e) if e.is_not_found() => {
                tracing::info!("Billing policy {} no longer exists, removing from state", id);
                Some((Value::Null, private_state))
            }
            Err(e) => {
                client_error(diags, format!("Failed to read billing policy '{}'", id), &e);
                None
            }
        }
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let state = Value::Value(BillingPolicyState {
            id: string(id.clone()),
            ..Default::default()
        });
        let read = self
            .read(diags, state, ValueEmpty::default(), ValueEmpty::default())
            .await;
        imported(diags, "billing policy", &id, read)
    }

    async fn plan_create<'a>(
        &self,
        diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = expect_state(diags, proposed_state)?;
        state.id = Value::Unknown;
        state.billing_instrument_id = Value::Unknown;
        if !matches!(state.status, Value::Value(_)) {
            state.status = Value::Unknown;
        }
        Some((Value::Value(state), Default::default()))
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
        let mut state = expect_state(diags, proposed_state)?;

        let mut replace = Vec::new();
        replace_if_changed(&mut replace, "location", &prior.location, &state.location);
        replace_if_changed(
            &mut replace,
            "billing_instrument",
            &prior.billing_instrument,
            &state.billing_instrument,
        );
        if !replace.is_empty() {
            state.id = Value::Unknown;
            state.billing_instrument_id = Value::Unknown;
        }
        if !matches!(state.status, Value::Value(_)) {
            state.status = prior.status;
        }

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

        let instrument = known(&plan.billing_instrument).cloned().unwrap_or_default();
        let request = BillingPolicyCreateDto {
            location: str_or_empty(&plan.location).to_string(),
            name: str_or_empty(&plan.name).to_string(),
            status: if is_unknown(&plan.status) {
                BILLING_POLICY_ENABLED.to_string()
            } else {
                str_or_empty(&plan.status).to_string()
            },
            billing_instrument: BillingInstrumentDto {
                resource_group: str_or_empty(&instrument.resource_group).to_string(),
                subscription_id: str_or_empty(&instrument.subscription_id).to_string(),
                ..Default::default()
            },
        };

        match client.licensing().create(&request).await {
            Ok(policy) => {
                tracing::info!("Created billing policy {}", policy.id);
                Some((Value::Value(policy.into()), private_state))
            }
            Err(e) => {
                client_error(diags, "Failed to create billing policy", &e);
                None
            }
        }
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let prior = expect_state(diags, prior_state)?;
        let plan = expect_state(diags, planned_state)?;
        let client = self.handle.client(diags).await?;
        let id = str_or_empty(&prior.id);

        if plan.name == prior.name && plan.status == prior.status {
            return Some((Value::Value(plan), private_state));
        }

        let request = BillingPolicyUpdateDto {
            name: str_or_empty(&plan.name).to_string(),
            status: known_str(&plan.status).unwrap_or_default().to_string(),
        };
        match client.licensing().update(id, &request).await {
            Ok(policy) => Some((Value::Value(policy.into()), private_state)),
            Err(e) => {
                client_error(diags, format!("Failed to update billing policy '{}'", id), &e);
                None
            }
        }
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
        let id = str_or_empty(&state.id);

        match client.licensing().delete(id).await {
            Ok(()) => Some(()),
            Err(e) => {
                client_error(diags, format!("Failed to delete billing policy '{}'", id), &e);
                None
            }
        }
    }
}
