//! Power Platform environment resource
//!
//! An environment may carry a Dataverse database. The configurable part of the
//! database lives in the `dataverse` object and is kept as configured; facts the
//! service computes for it are published in `dataverse_details`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{AttributeType, Schema};
use tf_provider::value::{Value, ValueEmpty};

use crate::api::environments::{
    CopilotPoliciesDto, CreateLinkedEnvironmentMetadataDto, CurrencyCodeDto, EnvironmentCreateDto,
    EnvironmentCreatePropertiesDto, EnvironmentDto, EnvironmentPropertiesDto, EnvironmentStatesDto,
    EnterprisePolicyDto, GenerativeAiFeaturesDto, GenerativeAiFeaturesPropertiesDto, IdDto,
    LinkedEnvironmentMetadataDto, TemplateMetadataDto, UsedByDto, BACKGROUND_OPERATIONS_DISABLED,
    BACKGROUND_OPERATIONS_ENABLED, CADENCES, DATABASE_TYPE_DATAVERSE, ENVIRONMENT_TYPES,
    ENVIRONMENT_TYPE_DEVELOPER, RUNTIME_STATE_ADMIN_MODE, RUNTIME_STATE_ENABLED,
};
use crate::api::{ApiError, Client};
use crate::config::ZERO_UUID;
use crate::provider_data::{client_error, ProviderHandle};
use crate::resources::{expect_state, imported, replace_if_changed};
use crate::schema::{computed, object_list, optional, optional_computed, required, schema, string_list};
use crate::values::{
    is_known, known, known_str, list, or_prior, str_or_empty, string, string_list as strings_value,
    string_or_null, strings, StringList,
};

const LOCATION_UNITED_STATES: &str = "unitedstates";
const POLICY_TYPE_NETWORK_INJECTION: &str = "NetworkInjection";
const POLICY_TYPE_ENCRYPTION: &str = "Encryption";
/// `usedBy.type` of a user principal
const PRINCIPAL_TYPE_USER: i64 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub id: Value<String>,
    pub display_name: Value<String>,
    pub description: Value<String>,
    pub location: Value<String>,
    pub azure_region: Value<String>,
    pub environment_type: Value<String>,
    pub owner_id: Value<String>,
    pub cadence: Value<String>,
    pub environment_group_id: Value<String>,
    pub billing_policy_id: Value<String>,
    pub allow_bing_search: Value<bool>,
    pub allow_moving_data_across_regions: Value<bool>,
    pub enterprise_policies: Value<Vec<Value<EnterprisePolicyState>>>,
    pub dataverse: Value<DataverseState>,
    pub dataverse_details: Value<DataverseDetailsState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnterprisePolicyState {
    #[serde(rename = "type")]
    pub policy_type: Value<String>,
    pub id: Value<String>,
    pub location: Value<String>,
    pub system_id: Value<String>,
    pub status: Value<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataverseState {
    pub currency_code: Value<String>,
    pub language_code: Value<i64>,
    pub domain: Value<String>,
    pub security_group_id: Value<String>,
    pub administration_mode_enabled: Value<bool>,
    pub background_operation_enabled: Value<bool>,
    pub templates: StringList,
    pub template_metadata: Value<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataverseDetailsState {
    pub url: Value<String>,
    pub organization_id: Value<String>,
    pub unique_name: Value<String>,
    pub version: Value<String>,
    pub linked_app_type: Value<String>,
    pub linked_app_id: Value<String>,
    pub linked_app_url: Value<String>,
}

fn enterprise_policy(policy_type: &str, policy: &EnterprisePolicyDto) -> EnterprisePolicyState {
    EnterprisePolicyState {
        policy_type: string(policy_type),
        id: string(policy.id.clone()),
        location: string(policy.location.clone()),
        system_id: string(policy.system_id.clone()),
        status: string(policy.link_status.clone()),
    }
}

fn template_metadata_json(metadata: &Option<TemplateMetadataDto>) -> Value<String> {
    match metadata {
        Some(m) if !m.post_provisioning_packages.is_empty() => serde_json::to_string(m)
            .map(Value::Value)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

impl EnvironmentState {
    /// The environment as the service reports it
    pub fn from_dto(env: EnvironmentDto, currency_code: Option<String>) -> Self {
        let props = env.properties;

        let mut policies = Vec::new();
        if let Some(enterprise) = &props.enterprise_policies {
            if let Some(vnets) = &enterprise.vnets {
                policies.push(enterprise_policy(POLICY_TYPE_NETWORK_INJECTION, vnets));
            }
            if let Some(keys) = &enterprise.customer_managed_keys {
                policies.push(enterprise_policy(POLICY_TYPE_ENCRYPTION, keys));
            }
        }

        let (dataverse, dataverse_details) = match &props.linked_environment_metadata {
            Some(metadata) => {
                let app = props.linked_app_metadata.clone().unwrap_or_default();
                (
                    Value::Value(DataverseState {
                        currency_code: currency_code.map(string_or_null).unwrap_or(Value::Null),
                        language_code: Value::Value(metadata.base_language),
                        domain: string(metadata.domain_name.clone()),
                        security_group_id: string(metadata.security_group_id.clone()),
                        administration_mode_enabled: Value::Value(
                            props.runtime_state() == RUNTIME_STATE_ADMIN_MODE,
                        ),
                        background_operation_enabled: Value::Value(
                            metadata.background_operations_state == BACKGROUND_OPERATIONS_ENABLED,
                        ),
                        templates: metadata
                            .templates
                            .clone()
                            .map(strings_value)
                            .unwrap_or(Value::Null),
                        template_metadata: template_metadata_json(&metadata.template_metadata),
                    }),
                    Value::Value(DataverseDetailsState {
                        url: string(props.instance_url().unwrap_or_default()),
                        organization_id: string(metadata.resource_id.clone()),
                        unique_name: string(metadata.unique_name.clone()),
                        version: string(metadata.version.clone()),
                        linked_app_type: string_or_null(app.app_type),
                        linked_app_id: string_or_null(app.id),
                        linked_app_url: string_or_null(app.url),
                    }),
                )
            }
            None => (Value::Null, Value::Null),
        };

        Self {
            id: string(env.name),
            display_name: string(props.display_name.clone()),
            description: string(props.description.clone()),
            location: string(env.location),
            azure_region: string(props.azure_region.clone()),
            environment_type: string(props.environment_sku.clone()),
            owner_id: Value::Null,
            cadence: string(
                props
                    .update_cadence
                    .as_ref()
                    .map(|c| c.id.clone())
                    .unwrap_or_default(),
            ),
            environment_group_id: string(props.environment_group_id().unwrap_or_default()),
            billing_policy_id: string(
                props
                    .billing_policy
                    .as_ref()
                    .map(|p| p.id.clone())
                    .unwrap_or_default(),
            ),
            allow_bing_search: Value::Value(props.bing_chat_enabled.unwrap_or(false)),
            allow_moving_data_across_regions: Value::Value(
                props
                    .copilot_policies
                    .as_ref()
                    .and_then(|p| p.cross_geo_copilot_data_movement_enabled)
                    .unwrap_or(false),
            ),
            enterprise_policies: list(policies),
            dataverse,
            dataverse_details,
        }
    }

    /// Align a freshly read state with what was configured: `owner_id` is not
    /// reported back, dataverse members left unset stay null, and templates and
    /// a missing currency come from `configured`.
    pub fn keep_configured(mut self, configured: &EnvironmentState) -> Self {
        self.owner_id = configured.owner_id.clone();

        if let (Value::Value(actual), Value::Value(wanted)) =
            (&mut self.dataverse, &configured.dataverse)
        {
            if !is_known(&actual.currency_code) {
                actual.currency_code = wanted.currency_code.clone();
            }
            actual.templates = wanted.templates.clone();
            actual.template_metadata = wanted.template_metadata.clone();

            fn mask<T>(actual: &mut Value<T>, wanted: &Value<T>) {
                if matches!(wanted, Value::Null) {
                    *actual = Value::Null;
                }
            }
            mask(&mut actual.currency_code, &wanted.currency_code);
            mask(&mut actual.domain, &wanted.domain);
            mask(&mut actual.security_group_id, &wanted.security_group_id);
            mask(
                &mut actual.administration_mode_enabled,
                &wanted.administration_mode_enabled,
            );
            mask(
                &mut actual.background_operation_enabled,
                &wanted.background_operation_enabled,
            );
        }
        self
    }
}

/// Object type of an environment, shared with the environments data source
pub fn environment_object_type() -> AttributeType {
    AttributeType::Object(map! {
        "id" => AttributeType::String,
        "display_name" => AttributeType::String,
        "description" => AttributeType::String,
        "location" => AttributeType::String,
        "azure_region" => AttributeType::String,
        "environment_type" => AttributeType::String,
        "owner_id" => AttributeType::String,
        "cadence" => AttributeType::String,
        "environment_group_id" => AttributeType::String,
        "billing_policy_id" => AttributeType::String,
        "allow_bing_search" => AttributeType::Bool,
        "allow_moving_data_across_regions" => AttributeType::Bool,
        "enterprise_policies" => enterprise_policies_type(),
        "dataverse" => dataverse_type(),
        "dataverse_details" => dataverse_details_type(),
    })
}

fn enterprise_policies_type() -> AttributeType {
    object_list(map! {
        "type" => AttributeType::String,
        "id" => AttributeType::String,
        "location" => AttributeType::String,
        "system_id" => AttributeType::String,
        "status" => AttributeType::String,
    })
}

fn dataverse_type() -> AttributeType {
    AttributeType::Object(map! {
        "currency_code" => AttributeType::String,
        "language_code" => AttributeType::Number,
        "domain" => AttributeType::String,
        "security_group_id" => AttributeType::String,
        "administration_mode_enabled" => AttributeType::Bool,
        "background_operation_enabled" => AttributeType::Bool,
        "templates" => string_list(),
        "template_metadata" => AttributeType::String,
    })
}

fn dataverse_details_type() -> AttributeType {
    AttributeType::Object(map! {
        "url" => AttributeType::String,
        "organization_id" => AttributeType::String,
        "unique_name" => AttributeType::String,
        "version" => AttributeType::String,
        "linked_app_type" => AttributeType::String,
        "linked_app_id" => AttributeType::String,
        "linked_app_url" => AttributeType::String,
    })
}

fn parse_template_metadata(raw: &Value<String>) -> Result<Option<TemplateMetadataDto>, String> {
    let Some(raw) = known_str(raw) else {
        return Ok(None);
    };
    let metadata: TemplateMetadataDto = serde_json::from_str(raw).map_err(|e| {
        format!("error when unmarshalling template metadata {}; internal error: {}", raw, e)
    })?;
    Ok((!metadata.post_provisioning_packages.is_empty()).then_some(metadata))
}

fn linked_metadata(dataverse: &DataverseState) -> Result<CreateLinkedEnvironmentMetadataDto, String> {
    Ok(CreateLinkedEnvironmentMetadataDto {
        base_language: known(&dataverse.language_code).copied().unwrap_or_default(),
        domain_name: str_or_empty(&dataverse.domain).to_string(),
        currency: Some(CurrencyCodeDto {
            code: str_or_empty(&dataverse.currency_code).to_string(),
        }),
        security_group_id: str_or_empty(&dataverse.security_group_id).to_string(),
        templates: strings(&dataverse.templates),
        template_metadata: parse_template_metadata(&dataverse.template_metadata)?,
    })
}

/// Creation request for a planned environment
pub fn create_request(plan: &EnvironmentState, tenant_id: &str) -> Result<EnvironmentCreateDto, String> {
    let mut properties = EnvironmentCreatePropertiesDto {
        display_name: str_or_empty(&plan.display_name).to_string(),
        environment_sku: str_or_empty(&plan.environment_type).to_string(),
        description: known_str(&plan.description).map(str::to_string),
        update_cadence: known_str(&plan.cadence).map(IdDto::new),
        azure_region: known_str(&plan.azure_region).map(str::to_string),
        billing_policy: known_str(&plan.billing_policy_id).map(IdDto::new),
        parent_environment_group: known_str(&plan.environment_group_id).map(IdDto::new),
        used_by: known_str(&plan.owner_id).map(|owner| UsedByDto {
            id: owner.to_string(),
            principal_type: PRINCIPAL_TYPE_USER,
            tenant_id: tenant_id.to_string(),
        }),
        ..Default::default()
    };

    if let Value::Value(dataverse) = &plan.dataverse {
        properties.database_type = Some(DATABASE_TYPE_DATAVERSE.to_string());
        properties.linked_environment_metadata = Some(linked_metadata(dataverse)?);
    }

    Ok(EnvironmentCreateDto {
        location: str_or_empty(&plan.location).to_string(),
        properties,
    })
}

/// Location rules for generative AI features
fn check_ai_location(plan: &EnvironmentState) -> Result<(), &'static str> {
    let location = str_or_empty(&plan.location);
    let moving_data = known(&plan.allow_moving_data_across_regions).copied();
    let bing = known(&plan.allow_bing_search).copied().unwrap_or(false);

    if location == LOCATION_UNITED_STATES && moving_data == Some(true) {
        return Err("Moving data across regions is not supported in the unitedstates location");
    }
    if location != LOCATION_UNITED_STATES && bing && moving_data != Some(true) {
        return Err("To enable AI generative features, moving data across regions must be enabled");
    }
    Ok(())
}

fn ai_features(plan: &EnvironmentState) -> GenerativeAiFeaturesDto {
    GenerativeAiFeaturesDto {
        properties: GenerativeAiFeaturesPropertiesDto {
            bing_chat_enabled: known(&plan.allow_bing_search).copied().unwrap_or(false),
            copilot_policies: Some(CopilotPoliciesDto {
                cross_geo_copilot_data_movement_enabled: known(
                    &plan.allow_moving_data_across_regions,
                )
                .copied(),
            }),
        },
    }
}

/// Default currency of a Dataverse environment; a failed lookup is a warning
async fn default_currency(
    client: &Client,
    diags: &mut Diagnostics,
    env: &EnvironmentDto,
) -> Option<String> {
    env.properties.instance_url()?;
    match client.environments().get_default_currency(&env.name).await {
        Ok(currency) => Some(currency.iso_currency_code),
        Err(ApiError::EnvironmentUrlNotFound(_)) => None,
        Err(e) => {
            tracing::warn!("Failed to read default currency of environment {}: {}", env.name, e);
            diags.root_warning(
                format!("Failed to read default currency of environment '{}'", env.name),
                e.to_string(),
            );
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentResource {
    handle: ProviderHandle,
}

impl EnvironmentResource {
    pub fn new(handle: ProviderHandle) -> Self {
        Self { handle }
    }

    fn validate_config(diags: &mut Diagnostics, config: &EnvironmentState) {
        let environment_type = known(&config.environment_type).map(String::as_str);
        let is_developer = environment_type == Some(ENVIRONMENT_TYPE_DEVELOPER);

        if let Some(t) = environment_type {
            if !ENVIRONMENT_TYPES.contains(&t) {
                diags.error(
                    "Invalid environment type",
                    format!("environment_type must be one of {}, got '{}'", ENVIRONMENT_TYPES.join(", "), t),
                    AttributePath::new("environment_type"),
                );
            }
        }
        if let Value::Value(cadence) = &config.cadence {
            if !CADENCES.contains(&cadence.as_str()) {
                diags.error(
                    "Invalid cadence",
                    format!("cadence must be one of {}, got '{}'", CADENCES.join(", "), cadence),
                    AttributePath::new("cadence"),
                );
            }
        }

        let owner_set = match &config.owner_id {
            Value::Value(owner) => !owner.is_empty(),
            Value::Null => false,
            Value::Unknown => true,
        };
        if is_developer && !owner_set {
            diags.error(
                "Missing owner",
                "owner_id is required for Developer environments",
                AttributePath::new("owner_id"),
            );
        }
        if owner_set && environment_type.is_some() && !is_developer {
            diags.error(
                "Unexpected owner",
                "owner_id can only be set for Developer environments",
                AttributePath::new("owner_id"),
            );
        }

        if let Value::Value(dataverse) = &config.dataverse {
            if !is_developer
                && environment_type.is_some()
                && matches!(dataverse.security_group_id, Value::Null)
            {
                diags.error(
                    "Missing security group",
                    "dataverse.security_group_id is required unless the environment is a Developer environment",
                    AttributePath::new("dataverse"),
                );
            }
            let admin_set = !matches!(dataverse.administration_mode_enabled, Value::Null);
            let background_set = !matches!(dataverse.background_operation_enabled, Value::Null);
            if admin_set != background_set {
                diags.error(
                    "Incomplete administration mode",
                    "administration_mode_enabled and background_operation_enabled must be set together",
                    AttributePath::new("dataverse"),
                );
            }
            if let Err(e) = parse_template_metadata(&dataverse.template_metadata) {
                diags.error("Invalid template metadata", e, AttributePath::new("dataverse"));
            }
        }
    }

    /// Read back an environment and align it with `configured`
    async fn refresh(
        client: &Client,
        diags: &mut Diagnostics,
        env: EnvironmentDto,
        configured: &EnvironmentState,
    ) -> EnvironmentState {
        let currency = default_currency(client, diags, &env).await;
        EnvironmentState::from_dto(env, currency).keep_configured(configured)
    }

    async fn move_billing_policy(
        client: &Client,
        id: &str,
        prior: &Value<String>,
        planned: &Value<String>,
    ) -> Result<(), ApiError> {
        if prior == planned || !is_known(planned) {
            return Ok(());
        }
        let environments = [id.to_string()];
        if let Some(old) = known_str(prior) {
            client.licensing().remove_environments(old, &environments).await?;
        }
        if let Some(new) = known_str(planned) {
            client.licensing().add_environments(new, &environments).await?;
        }
        Ok(())
    }

    /// Changes applied through the environment PATCH
    fn update_request(prior: &EnvironmentState, plan: &EnvironmentState) -> EnvironmentDto {
        let mut properties = EnvironmentPropertiesDto {
            display_name: str_or_empty(&plan.display_name).to_string(),
            environment_sku: str_or_empty(&plan.environment_type).to_string(),
            bing_chat_enabled: known(&plan.allow_bing_search).copied(),
            description: known_str(&plan.description).unwrap_or_default().to_string(),
            update_cadence: known_str(&plan.cadence).map(IdDto::new),
            billing_policy: known_str(&plan.billing_policy_id).map(IdDto::new),
            ..Default::default()
        };

        if let Value::Value(group) = &plan.environment_group_id {
            let group = if group.is_empty() { ZERO_UUID } else { group.as_str() };
            properties.parent_environment_group = Some(IdDto::new(group));
        }

        if let (Value::Value(_), Value::Value(dataverse)) = (&prior.dataverse, &plan.dataverse) {
            properties.linked_environment_metadata = Some(LinkedEnvironmentMetadataDto {
                domain_name: str_or_empty(&dataverse.domain).to_string(),
                security_group_id: str_or_empty(&dataverse.security_group_id).to_string(),
                background_operations_state: match known(&dataverse.background_operation_enabled) {
                    Some(true) => BACKGROUND_OPERATIONS_ENABLED.to_string(),
                    Some(false) => BACKGROUND_OPERATIONS_DISABLED.to_string(),
                    None => String::new(),
                },
                ..Default::default()
            });
            if let Some(admin) = known(&dataverse.administration_mode_enabled) {
                properties.states = Some(EnvironmentStatesDto {
                    management: None,
                    runtime: Some(IdDto::new(if *admin {
                        RUNTIME_STATE_ADMIN_MODE
                    } else {
                        RUNTIME_STATE_ENABLED
                    })),
                });
            }
        }

        EnvironmentDto {
            id: str_or_empty(&prior.id).to_string(),
            name: str_or_empty(&prior.id).to_string(),
            location: str_or_empty(&plan.location).to_string(),
            properties,
            ..Default::default()
        }
    }

    async fn apply_update(
        client: &Client,
        prior: &EnvironmentState,
        plan: &EnvironmentState,
    ) -> Result<EnvironmentDto, ApiError> {
        let id = str_or_empty(&prior.id);
        let environments = client.environments();

        if plan.environment_type != prior.environment_type {
            if let Some(sku) = known_str(&plan.environment_type) {
                tracing::info!("Changing environment {} type to {}", id, sku);
                environments.modify_sku(id, sku).await?;
            }
        }

        let ai_changed = plan.allow_bing_search != prior.allow_bing_search
            || plan.allow_moving_data_across_regions != prior.allow_moving_data_across_regions;
        if is_known(&plan.allow_bing_search) && ai_changed {
            environments.update_ai_features(id, &ai_features(plan)).await?;
        }

        if let (Value::Null, Value::Value(dataverse)) = (&prior.dataverse, &plan.dataverse) {
            let metadata = linked_metadata(dataverse).map_err(ApiError::Validation)?;
            tracing::info!("Provisioning Dataverse for environment {}", id);
            environments.add_dataverse(id, &metadata).await?;
        }

        Self::move_billing_policy(client, id, &prior.billing_policy_id, &plan.billing_policy_id)
            .await?;

        let request = Self::update_request(prior, plan);
        let updated = environments.update(id, &request).await?;
        tracing::debug!("Environment {} updated", id);
        Ok(updated)
    }
}

#[async_trait]
impl Resource for EnvironmentResource {
    type State<'a> = Value<EnvironmentState>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(schema(
            "Manages a Power Platform environment, optionally with a Dataverse database",
            map! {
                "id" => computed(AttributeType::String, "Unique environment id (guid)"),
                "display_name" => required(AttributeType::String, "Display name"),
                "description" => optional_computed(AttributeType::String, "Description of the environment"),
                "location" => required(
                    AttributeType::String,
                    "Location of the environment (europe, unitedstates etc.); changing it recreates the environment",
                ),
                "azure_region" => optional_computed(
                    AttributeType::String,
                    "Azure region of the environment; changing it recreates the environment",
                ),
                "environment_type" => required(
                    AttributeType::String,
                    "Type of the environment (Sandbox, Production, Trial, Developer)",
                ),
                "owner_id" => optional(
                    AttributeType::String,
                    "Entra ID user owning a Developer environment; changing it recreates the environment",
                ),
                "cadence" => optional_computed(AttributeType::String, "Update cadence, `Frequent` or `Moderate`"),
                "environment_group_id" => optional_computed(AttributeType::String, "Environment group id"),
                "billing_policy_id" => optional_computed(AttributeType::String, "Pay-as-you-go billing policy id"),
                "allow_bing_search" => optional_computed(AttributeType::Bool, "Allow Bing search in generative AI features"),
                "allow_moving_data_across_regions" => optional_computed(
                    AttributeType::Bool,
                    "Allow moving data across regions for generative AI features",
                ),
                "enterprise_policies" => computed(enterprise_policies_type(), "Enterprise policies linked to the environment"),
                "dataverse" => optional_computed(dataverse_type(), "Dataverse database of the environment"),
                "dataverse_details" => computed(dataverse_details_type(), "Service computed details of the Dataverse database"),
            },
        ))
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if let Value::Value(config) = &config {
            Self::validate_config(diags, config);
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

        match client.environments().get(id).await {
            Ok(env) => {
                let refreshed = Self::refresh(&client, diags, env, &state).await;
                Some((Value::Value(refreshed), private_state))
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("Environment {} no longer exists, removing from state", id);
                Some((Value::Null, private_state))
            }
            Err(e) => {
                client_error(diags, format!("Failed to read environment '{}'", id), &e);
                None
            }
        }
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let state = Value::Value(EnvironmentState {
            id: string(id.clone()),
            ..Default::default()
        });
        let read = self
            .read(diags, state, ValueEmpty::default(), ValueEmpty::default())
            .await;
        imported(diags, "environment", &id, read)
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
        state.enterprise_policies = Value::Unknown;
        state.dataverse_details = match state.dataverse {
            Value::Null => Value::Null,
            _ => Value::Unknown,
        };

        for value in [
            &mut state.description,
            &mut state.azure_region,
            &mut state.cadence,
            &mut state.environment_group_id,
            &mut state.billing_policy_id,
        ] {
            if matches!(value, Value::Null) {
                *value = Value::Unknown;
            }
        }
        for value in [
            &mut state.allow_bing_search,
            &mut state.allow_moving_data_across_regions,
        ] {
            if matches!(value, Value::Null) {
                *value = Value::Unknown;
            }
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
        replace_if_changed(&mut replace, "azure_region", &prior.azure_region, &state.azure_region);
        replace_if_changed(&mut replace, "owner_id", &prior.owner_id, &state.owner_id);

        match (&prior.dataverse, &state.dataverse) {
            // a database cannot be detached from an environment
            (Value::Value(_), Value::Null) => replace.push(AttributePath::new("dataverse")),
            (Value::Value(old), Value::Value(new)) => {
                let currency_changed = known_str(&old.currency_code).is_some()
                    && old.currency_code != new.currency_code;
                let language_changed =
                    is_known(&old.language_code) && old.language_code != new.language_code;
                if currency_changed || language_changed {
                    replace.push(AttributePath::new("dataverse"));
                }
            }
            _ => {}
        }

        if prior.dataverse != state.dataverse {
            state.dataverse_details = match state.dataverse {
                Value::Null => Value::Null,
                _ => Value::Unknown,
            };
        }
        state.enterprise_policies = or_prior(&state.enterprise_policies, &prior.enterprise_policies);

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

        if let Err(detail) = check_ai_location(&plan) {
            diags.root_error("Location validation failed", detail);
            return None;
        }

        let tenant_id = client.config().credentials.tenant_id.clone().unwrap_or_default();
        let request = match create_request(&plan, &tenant_id) {
            Ok(request) => request,
            Err(e) => {
                diags.error("Invalid template metadata", e, AttributePath::new("dataverse"));
                return None;
            }
        };

        let environments = client.environments();
        if let Err(e) = environments
            .validate_location(&request.location, request.properties.azure_region.as_deref())
            .await
        {
            client_error(diags, "Location validation failed", &e);
            return None;
        }
        if let Some(metadata) = &request.properties.linked_environment_metadata {
            if let Err(e) = environments
                .validate_language(&request.location, metadata.base_language)
                .await
            {
                client_error(diags, "Language code validation failed", &e);
                return None;
            }
            let currency = metadata.currency.as_ref().map(|c| c.code.as_str()).unwrap_or_default();
            if let Err(e) = environments.validate_currency(&request.location, currency).await {
                client_error(diags, "Currency code validation failed", &e);
                return None;
            }
        }

        let mut env = match environments.create(&request).await {
            Ok(env) => env,
            Err(e) => {
                client_error(diags, "Failed to create environment", &e);
                return None;
            }
        };
        tracing::info!("Created environment {}", env.name);

        if is_known(&plan.allow_bing_search) {
            let id = env.name.clone();
            let reread = match environments.update_ai_features(&id, &ai_features(&plan)).await {
                Ok(()) => environments.get(&id).await,
                Err(e) => Err(e),
            };
            match reread {
                Ok(updated) => env = updated,
                Err(e) => {
                    client_error(diags, format!("Failed to update environment '{}'", id), &e);
                    return None;
                }
            }
        }

        if let Some(policy) = known_str(&plan.billing_policy_id) {
            let attached = env.properties.billing_policy.as_ref().map(|p| p.id.as_str());
            if attached != Some(policy) {
                if let Err(e) = client
                    .licensing()
                    .add_environments(policy, &[env.name.clone()])
                    .await
                {
                    client_error(
                        diags,
                        format!("Failed to add environment '{}' to billing policy '{}'", env.name, policy),
                        &e,
                    );
                    return None;
                }
                env.properties.billing_policy = Some(IdDto::new(policy));
            }
        }

        let currency = known(&plan.dataverse).and_then(|d| known(&d.currency_code).cloned());
        let state = EnvironmentState::from_dto(env, currency).keep_configured(&plan);

        if let Some(region) = known_str(&plan.azure_region) {
            if str_or_empty(&state.azure_region) != region {
                diags.error(
                    format!("Provisioning environment in azure region '{}' failed", region),
                    "Provisioning environment in azure region was not successful, please try other region in that location or try again later",
                    AttributePath::new("azure_region"),
                );
                return None;
            }
        }

        Some((Value::Value(state), private_state))
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

        if let Err(detail) = check_ai_location(&plan) {
            diags.root_error("Location validation failed", detail);
            return None;
        }

        match Self::apply_update(&client, &prior, &plan).await {
            Ok(env) => {
                let refreshed = Self::refresh(&client, diags, env, &plan).await;
                Some((Value::Value(refreshed), private_state))
            }
            Err(e) => {
                client_error(
                    diags,
                    format!("Failed to update environment '{}'", str_or_empty(&prior.id)),
                    &e,
                );
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

        match client.environments().delete(id).await {
            Ok(()) => Some(()),
            Err(e) => {
                client_error(diags, format!("Failed to delete environment '{}'", id), &e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};

    const ENV_ID: &str = "00000000-0000-0000-0000-000000000001";
    const ENV_PATH: &str =
        "/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/00000000-0000-0000-0000-000000000001";

    fn sandbox() -> EnvironmentState {
        EnvironmentState {
            display_name: string("Example"),
            location: string("europe"),
            environment_type: string("Sandbox"),
            ..Default::default()
        }
    }

    fn dataverse() -> DataverseState {
        DataverseState {
            currency_code: string("EUR"),
            language_code: Value::Value(1033),
            security_group_id: string(ZERO_UUID),
            ..Default::default()
        }
    }

    fn environment_json(server_url: &str, with_dataverse: bool) -> serde_json::Value {
        let mut env = serde_json::json!({
            "id": format!("/providers/Microsoft.BusinessAppPlatform/environments/{}", ENV_ID),
            "name": ENV_ID,
            "location": "europe",
            "properties": {
                "displayName": "Example",
                "environmentSku": "Sandbox",
                "azureRegion": "westeurope",
                "description": "",
                "states": {"management": {"id": "Ready"}, "runtime": {"id": "Enabled"}},
                "updateCadence": {"id": "Frequent"},
                "billingPolicy": {"id": "p2"},
                "bingChatEnabled": false
            }
        });
        if with_dataverse {
            env["properties"]["linkedEnvironmentMetadata"] = serde_json::json!({
                "instanceUrl": format!("{}/", server_url),
                "domainName": "org",
                "baseLanguage": 1033,
                "securityGroupId": "",
                "resourceId": "org-id",
                "uniqueName": "unq",
                "version": "9.2",
                "backgroundOperationsState": "Enabled"
            });
        }
        env
    }

    fn resource(server: &Server) -> EnvironmentResource {
        EnvironmentResource::new(ProviderHandle::configured(create_test_client(&server.url())))
    }

    #[tokio::test]
    async fn validate_checks_owner_and_dataverse_rules() {
        let resource = EnvironmentResource::new(ProviderHandle::default());

        let mut developer = sandbox();
        developer.environment_type = string("Developer");
        let mut diags = Diagnostics::default();
        assert!(resource.validate(&mut diags, Value::Value(developer)).await.is_none());
        assert_eq!(diags.errors.len(), 1);

        let mut owned_sandbox = sandbox();
        owned_sandbox.owner_id = string("user");
        owned_sandbox.cadence = string("Weekly");
        let mut diags = Diagnostics::default();
        assert!(resource.validate(&mut diags, Value::Value(owned_sandbox)).await.is_none());
        assert_eq!(diags.errors.len(), 2);

        let mut half_admin = sandbox();
        half_admin.dataverse = Value::Value(DataverseState {
            administration_mode_enabled: Value::Value(true),
            security_group_id: Value::Null,
            ..dataverse()
        });
        let mut diags = Diagnostics::default();
        assert!(resource.validate(&mut diags, Value::Value(half_admin)).await.is_none());
        assert_eq!(diags.errors.len(), 2);

        let mut diags = Diagnostics::default();
        assert!(resource.validate(&mut diags, Value::Value(sandbox())).await.is_some());
    }

    #[test]
    fn ai_features_follow_location_rules() {
        let mut us = sandbox();
        us.location = string("unitedstates");
        us.allow_moving_data_across_regions = Value::Value(true);
        assert!(check_ai_location(&us).is_err());

        let mut europe = sandbox();
        europe.allow_bing_search = Value::Value(true);
        assert_eq!(
            check_ai_location(&europe),
            Err("To enable AI generative features, moving data across regions must be enabled")
        );
        europe.allow_moving_data_across_regions = Value::Value(true);
        assert!(check_ai_location(&europe).is_ok());
    }

    #[test]
    fn create_request_carries_dataverse_and_owner() {
        let mut plan = sandbox();
        plan.environment_type = string("Developer");
        plan.owner_id = string("user-1");
        plan.cadence = Value::Unknown;
        plan.dataverse = Value::Value(DataverseState {
            template_metadata: string(
                r#"{"PostProvisioningPackages":[{"applicationUniqueName":"app","parameters":"x=1"}]}"#,
            ),
            templates: strings_value(["D365_Sales"]),
            ..dataverse()
        });

        let request = create_request(&plan, "tenant").unwrap();

        assert_eq!(request.properties.update_cadence, None);
        assert_eq!(request.properties.database_type.as_deref(), Some(DATABASE_TYPE_DATAVERSE));
        let used_by = request.properties.used_by.unwrap();
        assert_eq!(used_by.id, "user-1");
        assert_eq!(used_by.tenant_id, "tenant");
        let metadata = request.properties.linked_environment_metadata.unwrap();
        assert_eq!(metadata.base_language, 1033);
        assert_eq!(metadata.templates, vec!["D365_Sales"]);
        assert_eq!(metadata.template_metadata.unwrap().post_provisioning_packages.len(), 1);
    }

    #[test]
    fn keep_configured_masks_unset_dataverse_members() {
        let env: EnvironmentDto =
            serde_json::from_value(environment_json("https://org.crm4.dynamics.com", true)).unwrap();
        let mut configured = sandbox();
        configured.owner_id = string("owner");
        configured.dataverse = Value::Value(dataverse());

        let state = EnvironmentState::from_dto(env, None).keep_configured(&configured);

        let dataverse = known(&state.dataverse).unwrap();
        assert_eq!(dataverse.currency_code, string("EUR"));
        assert_eq!(dataverse.domain, Value::Null);
        assert_eq!(dataverse.administration_mode_enabled, Value::Null);
        assert_eq!(dataverse.language_code, Value::Value(1033));
        let details = known(&state.dataverse_details).unwrap();
        assert_eq!(details.url, string("https://org.crm4.dynamics.com"));
        assert_eq!(details.linked_app_id, Value::Null);
        assert_eq!(state.owner_id, string("owner"));
        assert_eq!(state.billing_policy_id, string("p2"));
        assert_eq!(state.environment_group_id, string(""));
    }

    #[tokio::test]
    async fn create_rejects_moving_data_in_united_states() {
        let resource =
            EnvironmentResource::new(ProviderHandle::configured(create_test_client("http://127.0.0.1:1")));
        let mut plan = sandbox();
        plan.location = string("unitedstates");
        plan.allow_moving_data_across_regions = Value::Value(true);
        let plan = Value::Value(plan);
        let mut diags = Diagnostics::default();

        let created = resource
            .create(&mut diags, plan.clone(), plan, ValueEmpty::default(), ValueEmpty::default())
            .await;

        assert!(created.is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn create_provisions_environment_without_dataverse() {
        let mut server = Server::new_async().await;
        let locations = server
            .mock("GET", "/providers/Microsoft.BusinessAppPlatform/locations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"value":[{"name":"europe","properties":{"azureRegions":["westeurope"]}}]}"#)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/providers/Microsoft.BusinessAppPlatform/environments")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "location": "europe",
                "properties": {"displayName": "Example", "environmentSku": "Sandbox", "azureRegion": "westeurope"}
            })))
            .with_status(201)
            .with_body(
                serde_json::json!({"name": ENV_ID, "properties": {"provisioningState": "Succeeded"}})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", ENV_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(environment_json(&server.url(), false).to_string())
            .create_async()
            .await;
        server
            .mock("POST", "/licensing/billingPolicies/p2/environments/add")
            .match_query(Matcher::Any)
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let mut plan = sandbox();
        plan.azure_region = string("westeurope");
        plan.billing_policy_id = string("p2");
        let resource = resource(&server);
        let mut diags = Diagnostics::default();
        let (planned, _) = resource
            .plan_create(&mut diags, Value::Value(plan.clone()), Value::Value(plan), ValueEmpty::default())
            .await
            .unwrap();

        let (state, _) = resource
            .create(&mut diags, planned.clone(), planned, ValueEmpty::default(), ValueEmpty::default())
            .await
            .unwrap();

        locations.assert_async().await;
        create.assert_async().await;
        assert!(diags.errors.is_empty());
        let state = known(&state).unwrap();
        assert_eq!(state.id, string(ENV_ID));
        assert_eq!(state.cadence, string("Frequent"));
        assert_eq!(state.dataverse, Value::Null);
        assert_eq!(state.dataverse_details, Value::Null);
        assert_eq!(state.enterprise_policies, Value::Value(vec![]));
    }

    #[tokio::test]
    async fn read_drops_missing_environment() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", ENV_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let mut prior = sandbox();
        prior.id = string(ENV_ID);
        let mut diags = Diagnostics::default();
        let (state, _) = resource(&server)
            .read(&mut diags, Value::Value(prior), ValueEmpty::default(), ValueEmpty::default())
            .await
            .unwrap();

        assert_eq!(state, Value::Null);
        assert!(diags.errors.is_empty());
    }

    #[tokio::test]
    async fn read_keeps_prior_currency_when_lookup_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", ENV_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(environment_json(&server.url(), true).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/api/data/v9.2/organizations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"value":[]}"#)
            .create_async()
            .await;

        let mut prior = sandbox();
        prior.id = string(ENV_ID);
        prior.dataverse = Value::Value(dataverse());
        let mut diags = Diagnostics::default();
        let (state, _) = resource(&server)
            .read(&mut diags, Value::Value(prior), ValueEmpty::default(), ValueEmpty::default())
            .await
            .unwrap();

        assert!(diags.errors.is_empty());
        assert_eq!(diags.warnings.len(), 1);
        let dataverse = known(&known(&state).unwrap().dataverse).unwrap();
        assert_eq!(dataverse.currency_code, string("EUR"));
        assert_eq!(dataverse.background_operation_enabled, Value::Null);
    }

    #[tokio::test]
    async fn plan_update_replaces_on_language_change() {
        let resource = EnvironmentResource::new(ProviderHandle::default());
        let mut prior = sandbox();
        prior.id = string(ENV_ID);
        prior.dataverse = Value::Value(dataverse());
        let mut proposed = prior.clone();
        proposed.dataverse = Value::Value(DataverseState {
            language_code: Value::Value(1031),
            ..dataverse()
        });
        let mut diags = Diagnostics::default();

        let (state, _, replace) = resource
            .plan_update(
                &mut diags,
                Value::Value(prior),
                Value::Value(proposed.clone()),
                Value::Value(proposed),
                ValueEmpty::default(),
                ValueEmpty::default(),
            )
            .await
            .unwrap();

        assert_eq!(replace.len(), 1);
        assert_eq!(known(&state).unwrap().dataverse_details, Value::Unknown);
    }

    #[tokio::test]
    async fn update_moves_billing_policy() {
        let mut server = Server::new_async().await;
        let remove = server
            .mock("POST", "/licensing/billingPolicies/p1/environments/remove")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({"environmentIds": [ENV_ID]})))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let add = server
            .mock("POST", "/licensing/billingPolicies/p2/environments/add")
            .match_query(Matcher::Any)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", ENV_PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "properties": {"billingPolicy": {"id": "p2"}, "displayName": "Example"}
            })))
            .with_status(202)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", ENV_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(environment_json(&server.url(), false).to_string())
            .create_async()
            .await;

        let mut prior = EnvironmentState::from_dto(
            serde_json::from_value(environment_json(&server.url(), false)).unwrap(),
            None,
        );
        prior.billing_policy_id = string("p1");
        let mut plan = prior.clone();
        plan.billing_policy_id = string("p2");
        let mut diags = Diagnostics::default();

        let (state, _) = resource(&server)
            .update(
                &mut diags,
                Value::Value(prior),
                Value::Value(plan.clone()),
                Value::Value(plan),
                ValueEmpty::default(),
                ValueEmpty::default(),
            )
            .await
            .unwrap();

        remove.assert_async().await;
        add.assert_async().await;
        patch.assert_async().await;
        assert_eq!(known(&state).unwrap().billing_policy_id, string("p2"));
    }

    #[tokio::test]
    async fn import_reads_environment_by_id() {
        let mut server = Server::new_async().await;
        let get = server
            .mock("GET", ENV_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(environment_json(&server.url(), false).to_string())
            .create_async()
            .await;

        let mut diags = Diagnostics::default();
        let (state, _) = resource(&server)
            .import(&mut diags, ENV_ID.to_string())
            .await
            .unwrap();

        get.assert_async().await;
        let state = known(&state).unwrap();
        assert_eq!(state.id, string(ENV_ID));
        assert_eq!(state.display_name, string("Example"));
        assert_eq!(state.billing_policy_id, string("p2"));
        assert_eq!(state.dataverse, Value::Null);
        assert!(diags.errors.is_empty());
    }

    #[tokio::test]
    async fn import_fails_for_missing_environment() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", ENV_PATH)
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let mut diags = Diagnostics::default();
        let imported = resource(&server).import(&mut diags, ENV_ID.to_string()).await;

        assert!(imported.is_none());
        assert_eq!(diags.errors.len(), 1);
    }
}
