//! Environment admin API (Business App Platform)

pub mod dto;

use reqwest::Method;

use crate::api::common::{build_url, last_segment, ApiQueryParams, ApiResponse, ArrayResponse};
use crate::api::error::ApiError;
use crate::api::Client;
use crate::config::{BAP_2021_API_VERSION, BAP_API_VERSION, DATAVERSE_API_VERSION, ZERO_UUID};

pub use dto::*;

const BAP_PROVIDER_PATH: &str = "/providers/Microsoft.BusinessAppPlatform";
const ENVIRONMENT_EXPAND: &str =
    "permissions,properties.capacity,properties/billingPolicy,properties/copilotPolicies";
const ENVIRONMENT_LIST_EXPAND: &str = "properties/billingPolicy,properties/copilotPolicies";
const UPDATE_EXPAND: &str = "permissions,properties.capacity,properties/billingPolicy";

/// Attempts made when the service keeps answering with a conflict or a failed operation
pub const MAX_OPERATION_ATTEMPTS: u32 = 10;

const PROVISIONING_SUCCEEDED: &str = "Succeeded";
const PROVISIONING_DATABASE: &str = "LinkedDatabaseProvisioning";
const MANAGEMENT_READY: &str = "Ready";
const MANAGEMENT_RUNNING: &str = "Running";

/// Environment API providing lifecycle and catalogue operations
pub struct EnvironmentsApi<'a> {
    client: &'a Client,
}

impl<'a> EnvironmentsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn url(&self, path: &str, params: &ApiQueryParams) -> String {
        build_url(
            &self.client.config().urls.bapi_url,
            &format!("{}/{}", BAP_PROVIDER_PATH, path.trim_start_matches('/')),
            params,
        )
    }

    fn environment_url(&self, environment_id: &str, params: &ApiQueryParams) -> String {
        self.url(
            &format!("scopes/admin/environments/{}", environment_id),
            params,
        )
    }

    /// GET /providers/Microsoft.BusinessAppPlatform/locations
    pub async fn get_locations(&self) -> Result<Vec<LocationDto>, ApiError> {
        let url = self.url("locations", &ApiQueryParams::api_version(BAP_API_VERSION));
        let response: ArrayResponse<LocationDto> = self.client.get(&url).await?;
        Ok(response.value)
    }

    /// Check that `location` exists and, when given, that it offers `azure_region`
    pub async fn validate_location(
        &self,
        location: &str,
        azure_region: Option<&str>,
    ) -> Result<(), ApiError> {
        let locations = self.get_locations().await?;
        let found = locations
            .iter()
            .find(|l| l.name == location)
            .ok_or_else(|| {
                ApiError::Validation(format!(
                    "location '{}' is not valid. valid locations are: {}",
                    location,
                    locations
                        .iter()
                        .map(|l| l.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;

        match azure_region.filter(|r| !r.is_empty()) {
            Some(region) if !found.properties.azure_regions.iter().any(|r| r == region) => {
                Err(ApiError::Validation(format!(
                    "region '{}' is not valid for location {}. valid regions are: {}",
                    region,
                    found.name,
                    found.properties.azure_regions.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }

    /// GET /providers/Microsoft.BusinessAppPlatform/locations/{location}/environmentCurrencies
    pub async fn get_currencies(&self, location: &str) -> Result<Vec<CurrencyDto>, ApiError> {
        let url = self.url(
            &format!("locations/{}/environmentCurrencies", location),
            &ApiQueryParams::api_version(BAP_API_VERSION),
        );
        let response: ArrayResponse<CurrencyDto> = self.client.get(&url).await?;
        Ok(response.value)
    }

    /// GET /providers/Microsoft.BusinessAppPlatform/locations/{location}/environmentLanguages
    pub async fn get_languages(&self, location: &str) -> Result<Vec<LanguageDto>, ApiError> {
        let url = self.url(
            &format!("locations/{}/environmentLanguages", location),
            &ApiQueryParams::api_version(BAP_API_VERSION),
        );
        let response: ArrayResponse<LanguageDto> = self.client.get(&url).await?;
        Ok(response.value)
    }

    pub async fn validate_currency(&self, location: &str, code: &str) -> Result<(), ApiError> {
        let currencies = self.get_currencies(location).await?;
        if currencies.iter().any(|c| c.name == code) {
            return Ok(());
        }
        Err(ApiError::Validation(format!(
            "currency code {} is not valid. valid currency codes are: {}",
            code,
            currencies
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    pub async fn validate_language(&self, location: &str, code: i64) -> Result<(), ApiError> {
        let languages = self.get_languages(location).await?;
        let code = code.to_string();
        if languages.iter().any(|l| l.name == code) {
            return Ok(());
        }
        Err(ApiError::Validation(format!(
            "language code {} is not valid. valid language codes are: {}",
            code,
            languages
                .iter()
                .map(|l| l.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// GET /providers/Microsoft.BusinessAppPlatform/locations/{location}/templates
    pub async fn get_templates(&self, location: &str) -> Result<EnvironmentTemplatesDto, ApiError> {
        let url = self.url(
            &format!("locations/{}/templates", location),
            &ApiQueryParams::api_version(BAP_API_VERSION),
        );
        self.client.get(&url).await
    }

    /// GET /providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{id}
    pub async fn get(&self, environment_id: &str) -> Result<EnvironmentDto, ApiError> {
        let url = self.environment_url(
            environment_id,
            &ApiQueryParams::new()
                .add("$expand", ENVIRONMENT_EXPAND)
                .add(crate::config::API_VERSION_PARAM, BAP_API_VERSION),
        );

        let mut environment: EnvironmentDto = match self.client.get(&url).await {
            Ok(env) => env,
            Err(e) if e.status() == Some(404) => {
                return Err(ApiError::ObjectNotFound(format!(
                    "environment '{}' not found",
                    environment_id
                )));
            }
            Err(e) => return Err(e),
        };

        if let Some(metadata) = environment.properties.linked_environment_metadata.as_mut() {
            if metadata.security_group_id.is_empty() {
                metadata.security_group_id = ZERO_UUID.to_string();
            }
        }
        if let Some(group) = environment.properties.parent_environment_group.as_mut() {
            if group.id.is_empty() {
                group.id = ZERO_UUID.to_string();
            }
        }

        Ok(environment)
    }

    /// GET /providers/Microsoft.BusinessAppPlatform/scopes/admin/environments
    pub async fn list(&self) -> Result<Vec<EnvironmentDto>, ApiError> {
        let url = self.url(
            "scopes/admin/environments",
            &ApiQueryParams::new()
                .add("$expand", ENVIRONMENT_LIST_EXPAND)
                .add(crate::config::API_VERSION_PARAM, BAP_API_VERSION),
        );
        let response: ArrayResponse<EnvironmentDto> = self.client.get(&url).await?;
        Ok(response.value)
    }

    /// POST /providers/Microsoft.BusinessAppPlatform/validateEnvironmentDetails
    pub async fn validate_environment_details(
        &self,
        location: &str,
        domain: &str,
    ) -> Result<(), ApiError> {
        let url = self.url(
            "validateEnvironmentDetails",
            &ApiQueryParams::api_version(BAP_2021_API_VERSION),
        );
        let details = ValidateEnvironmentDetailsDto {
            domain_name: domain.to_string(),
            environment_location: location.to_string(),
        };
        self.client
            .execute(Method::POST, &url, None, Some(&details), &[200])
            .await?;
        Ok(())
    }

    /// POST /providers/Microsoft.BusinessAppPlatform/environments
    ///
    /// Waits for provisioning and returns the environment as read back from the service
    pub async fn create(&self, environment: &EnvironmentCreateDto) -> Result<EnvironmentDto, ApiError> {
        if let Some(metadata) = &environment.properties.linked_environment_metadata {
            if !environment.location.is_empty() && !metadata.domain_name.is_empty() {
                self.validate_environment_details(&environment.location, &metadata.domain_name)
                    .await?;
            }
        }

        let url = self.url("environments", &ApiQueryParams::api_version(BAP_API_VERSION));
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let response = self
                .client
                .execute(Method::POST, &url, None, Some(environment), &[201, 202, 409, 500])
                .await?;
            if response.status != 409 {
                break response;
            }
            self.handle_conflict(&response, attempt).await?;
        };

        if response.status == 500 {
            return Err(ApiError::EnvironmentCreation(response.body));
        }

        tracing::debug!("Environment creation returned HTTP {}", response.status);

        let environment_id = if response.status == 202 {
            match self.client.wait_for_lifecycle(&response).await? {
                Some(lifecycle) if lifecycle.is_succeeded() => {
                    let id = last_segment(&lifecycle.links.environment.path).to_string();
                    if id.is_empty() {
                        return Err(ApiError::EnvironmentCreation(format!(
                            "can't parse environment id from response '{}'",
                            lifecycle.links.environment.path
                        )));
                    }
                    id
                }
                Some(lifecycle) => {
                    return Err(ApiError::EnvironmentCreation(format!(
                        "provisioning state: {}, failed stages: [{}]",
                        lifecycle.state.id,
                        lifecycle.failed_stages().join(", ")
                    )));
                }
                None => {
                    return Err(ApiError::EnvironmentCreation(
                        "the service accepted the request without an operation location"
                            .to_string(),
                    ));
                }
            }
        } else {
            let created: EnvironmentCreatedDto = response.json()?;
            if created.properties.provisioning_state != PROVISIONING_SUCCEEDED {
                return Err(ApiError::EnvironmentCreation(format!(
                    "provisioning state: {}",
                    created.properties.provisioning_state
                )));
            }
            created.name
        };

        tracing::debug!("Created environment {}", environment_id);

        let mut created = self.get(&environment_id).await.map_err(|e| {
            ApiError::EnvironmentCreation(format!(
                "environment '{}' not found after creation: {}",
                environment_id, e
            ))
        })?;

        if let (Some(requested), Some(metadata)) = (
            &environment.properties.linked_environment_metadata,
            created.properties.linked_environment_metadata.as_mut(),
        ) {
            if !requested.templates.is_empty() {
                metadata.templates = Some(requested.templates.clone());
                metadata.template_metadata = requested.template_metadata.clone();
            }
        }

        Ok(created)
    }

    /// PATCH /providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{id}
    ///
    /// Returns once the environment is back in the `Ready` management state
    pub async fn update(
        &self,
        environment_id: &str,
        environment: &EnvironmentDto,
    ) -> Result<EnvironmentDto, ApiError> {
        let url = self.environment_url(
            environment_id,
            &ApiQueryParams::new()
                .add("$expand", UPDATE_EXPAND)
                .add(crate::config::API_VERSION_PARAM, BAP_2021_API_VERSION),
        );

        self.run_operation("update", Method::PATCH, &url, Some(environment), &[202, 409])
            .await?;

        let timeout = self.client.config().lifecycle_timeout;
        let poll = async {
            loop {
                self.client.sleep(self.client.default_retry_after()).await;
                let current = self.get(environment_id).await?;
                let state = current.properties.management_state();
                tracing::info!("Environment {} management state: '{}'", environment_id, state);
                match state {
                    MANAGEMENT_READY => return Ok(current),
                    MANAGEMENT_RUNNING => continue,
                    other => {
                        return Err(ApiError::LifecycleFailed(format!(
                            "environment update failed. unexpected management state: {}",
                            other
                        )))
                    }
                }
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ApiError::Timeout(timeout.as_secs()))?
    }

    /// DELETE /providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{id}
    pub async fn delete(&self, environment_id: &str) -> Result<(), ApiError> {
        let url = self.environment_url(environment_id, &ApiQueryParams::api_version(BAP_API_VERSION));
        let body = EnvironmentDeleteDto::default();

        let response = self
            .run_operation("deletion", Method::DELETE, &url, Some(&body), &[202, 204, 404, 409])
            .await?;
        if response.status == 404 {
            tracing::info!(
                "Environment '{}' not found. Treating as successfully deleted",
                environment_id
            );
        }
        Ok(())
    }

    /// POST /providers/Microsoft.BusinessAppPlatform/environments/{id}/provisionInstance
    pub async fn add_dataverse(
        &self,
        environment_id: &str,
        metadata: &CreateLinkedEnvironmentMetadataDto,
    ) -> Result<EnvironmentDto, ApiError> {
        let url = self.url(
            &format!("environments/{}/provisionInstance", environment_id),
            &ApiQueryParams::api_version(BAP_2021_API_VERSION),
        );
        let response = self
            .client
            .execute(Method::POST, &url, None, Some(metadata), &[202])
            .await?;

        let location = crate::api::lifecycle::operation_location(&response)
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::LifecycleFailed(
                    "dataverse provisioning returned no operation location".to_string(),
                )
            })?;
        let wait = self.client.retry_after(&response.headers);
        let timeout = self.client.config().lifecycle_timeout;

        let poll = async {
            loop {
                self.client.sleep(wait).await;
                let response = self
                    .client
                    .execute::<()>(Method::GET, &location, None, None, &[200, 202, 409])
                    .await?;
                if response.status == 409 || response.is_empty() {
                    tracing::debug!("Dataverse provisioning returned HTTP {}", response.status);
                    continue;
                }

                let state: EnvironmentDto = response.json()?;
                let provisioning = state.properties.provisioning_state.as_str();
                tracing::debug!("Dataverse provisioning state: '{}'", provisioning);
                match provisioning {
                    PROVISIONING_SUCCEEDED => return Ok(()),
                    PROVISIONING_DATABASE | "" => continue,
                    other => {
                        return Err(ApiError::LifecycleFailed(format!(
                            "dataverse creation failed. provisioning state: {}",
                            other
                        )))
                    }
                }
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ApiError::Timeout(timeout.as_secs()))??;

        self.get(environment_id).await
    }

    /// POST /providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{id}/modifySku
    pub async fn modify_sku(&self, environment_id: &str, sku: &str) -> Result<(), ApiError> {
        let url = self.url(
            &format!("scopes/admin/environments/{}/modifySku", environment_id),
            &ApiQueryParams::api_version(BAP_2021_API_VERSION),
        );
        let body = ModifySkuDto {
            environment_sku: sku.to_string(),
        };
        self.run_operation("sku change", Method::POST, &url, Some(&body), &[200, 202, 409])
            .await?;
        Ok(())
    }

    /// PATCH the generative AI switches of an environment
    pub async fn update_ai_features(
        &self,
        environment_id: &str,
        features: &GenerativeAiFeaturesDto,
    ) -> Result<(), ApiError> {
        let url = self.environment_url(
            environment_id,
            &ApiQueryParams::api_version(BAP_2021_API_VERSION),
        );
        self.run_operation("AI features update", Method::PATCH, &url, Some(features), &[202, 409])
            .await?;
        Ok(())
    }

    /// Default currency of the environment's Dataverse organization
    pub async fn get_default_currency(
        &self,
        environment_id: &str,
    ) -> Result<TransactionCurrencyDto, ApiError> {
        let environment = self.get(environment_id).await?;
        let instance_url = environment
            .properties
            .instance_url()
            .ok_or_else(|| {
                ApiError::EnvironmentUrlNotFound(
                    "environment url not found, please check if the environment has dataverse linked"
                        .to_string(),
                )
            })?
            .to_string();

        let organizations: ArrayResponse<OrganizationSettingsDto> = self
            .client
            .get(&format!(
                "{}/api/data/{}/organizations",
                instance_url, DATAVERSE_API_VERSION
            ))
            .await?;
        let base_currency_id = organizations
            .value
            .first()
            .map(|o| o.base_currency_id.clone())
            .ok_or_else(|| {
                ApiError::ObjectNotFound(format!(
                    "no organization settings found for environment {}",
                    environment_id
                ))
            })?;

        let url = build_url(
            &instance_url,
            &format!("api/data/{}/transactioncurrencies", DATAVERSE_API_VERSION),
            &ApiQueryParams::new().add(
                "$filter",
                format!("transactioncurrencyid eq {}", base_currency_id),
            ),
        );
        let currencies: ArrayResponse<TransactionCurrencyDto> = self.client.get(&url).await?;
        currencies.value.into_iter().next().ok_or_else(|| {
            ApiError::ObjectNotFound(format!(
                "no default currency found for environment {}",
                environment_id
            ))
        })
    }

    /// Decide whether a 409 can be waited out: only another running operation qualifies
    pub async fn handle_conflict(&self, response: &ApiResponse, attempt: u32) -> Result<(), ApiError> {
        if response.is_empty() {
            return Err(ApiError::Validation(
                "environment failed with HTTP 409. No body in response".to_string(),
            ));
        }
        if !response.body.contains("OperationNotStartable") {
            return Err(ApiError::Validation(format!(
                "environment failed with HTTP 409. Body: {}",
                response.body
            )));
        }
        if attempt >= MAX_OPERATION_ATTEMPTS {
            return Err(ApiError::LifecycleFailed(format!(
                "maximum retries ({}) reached while another operation was running",
                MAX_OPERATION_ATTEMPTS
            )));
        }
        tracing::debug!("Another lifecycle operation is in progress, waiting for it to complete");
        self.client.sleep(self.client.default_retry_after()).await;
        Ok(())
    }

    /// Send a lifecycle request, waiting out conflicts and retrying failed operations
    async fn run_operation<B: serde::Serialize + ?Sized>(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&B>,
        acceptable: &[u16],
    ) -> Result<ApiResponse, ApiError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self
                .client
                .execute(method.clone(), url, None, body, acceptable)
                .await?;

            match response.status {
                409 => {
                    self.handle_conflict(&response, attempt).await?;
                    continue;
                }
                404 => return Ok(response),
                _ => {}
            }

            match self.client.wait_for_lifecycle(&response).await? {
                Some(lifecycle) if lifecycle.is_failed() => {
                    if attempt >= MAX_OPERATION_ATTEMPTS {
                        return Err(ApiError::LifecycleFailed(format!(
                            "environment {} failed after {} attempts",
                            operation, attempt
                        )));
                    }
                    tracing::info!("Environment {} failed. Retrying", operation);
                    self.client.sleep(self.client.default_retry_after()).await;
                }
                _ => return Ok(response),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use crate::config::ProviderConfig;
    use mockito::{Matcher, Server};

    const ENV_ID: &str = "00000000-0000-0000-0000-000000000001";

    fn environment_body(server_url: &str, management_state: &str) -> String {
        serde_json::json!({
            "id": format!("/providers/Microsoft.BusinessAppPlatform/environments/{}", ENV_ID),
            "name": ENV_ID,
            "location": "europe",
            "properties": {
                "displayName": "Example",
                "environmentSku": "Sandbox",
                "azureRegion": "westeurope",
                "states": {"management": {"id": management_state}, "runtime": {"id": "Enabled"}},
                "linkedEnvironmentMetadata": {
                    "instanceUrl": format!("{}/", server_url),
                    "domainName": "org",
                    "baseLanguage": 1033,
                    "securityGroupId": ""
                },
                "updateCadence": {"id": "Frequent"}
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn validate_location_lists_valid_names() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/providers/Microsoft.BusinessAppPlatform/locations")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2023-06-01".into()))
            .with_status(200)
            .with_body(
                r#"{"value":[
                    {"name":"europe","properties":{"azureRegions":["westeurope","northeurope"]}},
                    {"name":"unitedstates","properties":{"azureRegions":["eastus"]}}
                ]}"#,
            )
            .expect_at_least(1)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let api = client.environments();

        api.validate_location("europe", Some("westeurope")).await.unwrap();
        api.validate_location("europe", None).await.unwrap();

        let err = api.validate_location("mars", None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "location 'mars' is not valid. valid locations are: europe, unitedstates"
        );

        let err = api.validate_location("europe", Some("eastus")).await.unwrap_err();
        assert!(err.to_string().contains("region 'eastus' is not valid for location europe"));
    }

    #[tokio::test]
    async fn validate_language_and_currency_match_names() {
        let mut server = Server::new_async().await;
        let _languages = server
            .mock("GET", "/providers/Microsoft.BusinessAppPlatform/locations/europe/environmentLanguages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"value":[{"name":"1033","properties":{"localeId":1033,"displayName":"English"}}]}"#)
            .create_async()
            .await;
        let _currencies = server
            .mock("GET", "/providers/Microsoft.BusinessAppPlatform/locations/europe/environmentCurrencies")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"value":[{"name":"EUR","properties":{"code":"EUR","symbol":"€"}},{"name":"USD"}]}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let api = client.environments();

        api.validate_language("europe", 1033).await.unwrap();
        assert!(api.validate_language("europe", 1031).await.is_err());
        api.validate_currency("europe", "EUR").await.unwrap();

        let err = api.validate_currency("europe", "PLN").await.unwrap_err();
        assert!(err.to_string().ends_with("valid currency codes are: EUR, USD"));
    }

    #[tokio::test]
    async fn get_maps_404_to_object_not_found_and_normalises_ids() {
        let mut server = Server::new_async().await;
        let _missing = server
            .mock("GET", "/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let _found = server
            .mock(
                "GET",
                format!("/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{}", ENV_ID).as_str(),
            )
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api-version".into(), "2023-06-01".into()),
                Matcher::UrlEncoded("$expand".into(), ENVIRONMENT_EXPAND.into()),
            ]))
            .with_status(200)
            .with_body(environment_body(&server.url(), "Ready"))
            .create_async()
            .await;

        let client = create_test_client(&server.url());

        let err = client.environments().get("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::ObjectNotFound(_)));

        let env = client.environments().get(ENV_ID).await.unwrap();
        assert_eq!(
            env.properties.linked_environment_metadata.unwrap().security_group_id,
            ZERO_UUID
        );
    }

    #[tokio::test]
    async fn create_follows_lifecycle_and_rereads() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/providers/Microsoft.BusinessAppPlatform/environments")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2023-06-01".into()))
            .with_status(202)
            .with_header("location", format!("{}/lifecycle/op-1", server.url()).as_str())
            .with_header("retry-after", "1")
            .create_async()
            .await;
        let _lifecycle = server
            .mock("GET", "/lifecycle/op-1")
            .with_status(200)
            .with_body(format!(
                r#"{{"id":"op-1","state":{{"id":"Succeeded"}},"links":{{"environment":{{"path":"/providers/Microsoft.BusinessAppPlatform/environments/{}"}}}}}}"#,
                ENV_ID
            ))
            .create_async()
            .await;
        let _get = server
            .mock(
                "GET",
                format!("/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{}", ENV_ID).as_str(),
            )
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(environment_body(&server.url(), "Ready"))
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let request = EnvironmentCreateDto {
            location: "europe".to_string(),
            properties: EnvironmentCreatePropertiesDto {
                display_name: "Example".to_string(),
                environment_sku: "Sandbox".to_string(),
                ..Default::default()
            },
        };

        let env = client.environments().create(&request).await.unwrap();
        assert_eq!(env.name, ENV_ID);
        assert_eq!(env.properties.display_name, "Example");
        create.assert_async().await;
    }

    #[tokio::test]
    async fn create_surfaces_server_errors() {
        let mut server = Server::new_async().await;
        let _create = server
            .mock("POST", "/providers/Microsoft.BusinessAppPlatform/environments")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"error":{"code":"InternalError"}}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let err = client
            .environments()
            .create(&EnvironmentCreateDto::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(crate::api::error::ERROR_ENVIRONMENT_CREATION));
        assert!(err.to_string().contains("InternalError"));
    }

    #[tokio::test]
    async fn conflict_without_running_operation_fails() {
        let mut server = Server::new_async().await;
        let _update = server
            .mock(
                "PATCH",
                format!("/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{}", ENV_ID).as_str(),
            )
            .match_query(Matcher::Any)
            .with_status(409)
            .with_body(r#"{"error":{"code":"DomainNameInUse"}}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let err = client
            .environments()
            .update(ENV_ID, &EnvironmentDto::default())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("environment failed with HTTP 409. Body:"));
    }

    #[tokio::test]
    async fn update_waits_out_conflicts_until_ready() {
        let mut server = Server::new_async().await;
        let path = format!("/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{}", ENV_ID);
        let conflict = server
            .mock("PATCH", path.as_str())
            .match_query(Matcher::Any)
            .with_status(409)
            .with_body(r#"{"error":{"code":"OperationNotStartable"}}"#)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("PATCH", path.as_str())
            .match_query(Matcher::Any)
            .with_status(202)
            .create_async()
            .await;
        let _get = server
            .mock("GET", path.as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(environment_body(&server.url(), "Ready"))
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let env = client
            .environments()
            .update(ENV_ID, &EnvironmentDto::default())
            .await
            .unwrap();

        assert_eq!(env.properties.management_state(), "Ready");
        conflict.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn update_gives_up_when_environment_stays_running() {
        let mut server = Server::new_async().await;
        let path = format!("/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{}", ENV_ID);
        let _patch = server
            .mock("PATCH", path.as_str())
            .match_query(Matcher::Any)
            .with_status(202)
            .create_async()
            .await;
        let _get = server
            .mock("GET", path.as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(environment_body(&server.url(), "Running"))
            .create_async()
            .await;

        let mut config = ProviderConfig::for_test(&server.url());
        config.lifecycle_timeout = std::time::Duration::from_millis(300);
        let client = Client::new(config).unwrap();
        let result = client
            .environments()
            .update(ENV_ID, &EnvironmentDto::default())
            .await;

        assert!(matches!(result, Err(ApiError::Timeout(_))));
    }

    #[tokio::test]
    async fn delete_treats_not_found_as_deleted() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/gone")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2023-06-01".into()))
            .match_body(Matcher::Json(serde_json::json!({
                "code": "7",
                "message": "Deleted using Power Platform Terraform Provider"
            })))
            .with_status(404)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        client.environments().delete("gone").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_retries_failed_operation() {
        let mut server = Server::new_async().await;
        let path = format!("/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{}", ENV_ID);
        let location = format!("{}/lifecycle/delete", server.url());
        let delete = server
            .mock("DELETE", path.as_str())
            .match_query(Matcher::Any)
            .with_status(202)
            .with_header("location", location.as_str())
            .expect(2)
            .create_async()
            .await;
        let failed = server
            .mock("GET", "/lifecycle/delete")
            .with_status(200)
            .with_body(r#"{"id":"delete","state":{"id":"Failed"}}"#)
            .expect(1)
            .create_async()
            .await;
        let succeeded = server
            .mock("GET", "/lifecycle/delete")
            .with_status(200)
            .with_body(r#"{"id":"delete","state":{"id":"Succeeded"}}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        client.environments().delete(ENV_ID).await.unwrap();

        delete.assert_async().await;
        failed.assert_async().await;
        succeeded.assert_async().await;
    }

    #[tokio::test]
    async fn add_dataverse_polls_provisioning_state() {
        let mut server = Server::new_async().await;
        let _provision = server
            .mock(
                "POST",
                format!("/providers/Microsoft.BusinessAppPlatform/environments/{}/provisionInstance", ENV_ID).as_str(),
            )
            .match_query(Matcher::UrlEncoded("api-version".into(), "2021-04-01".into()))
            .with_status(202)
            .with_header("location", format!("{}/provisioning/op-9", server.url()).as_str())
            .create_async()
            .await;
        let provisioning = server
            .mock("GET", "/provisioning/op-9")
            .with_status(200)
            .with_body(r#"{"properties":{"provisioningState":"LinkedDatabaseProvisioning"}}"#)
            .expect(1)
            .create_async()
            .await;
        let _done = server
            .mock("GET", "/provisioning/op-9")
            .with_status(200)
            .with_body(r#"{"properties":{"provisioningState":"Succeeded"}}"#)
            .create_async()
            .await;
        let _get = server
            .mock(
                "GET",
                format!("/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{}", ENV_ID).as_str(),
            )
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(environment_body(&server.url(), "Ready"))
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let metadata = CreateLinkedEnvironmentMetadataDto {
            base_language: 1033,
            currency: Some(CurrencyCodeDto {
                code: "EUR".to_string(),
            }),
            ..Default::default()
        };
        let env = client.environments().add_dataverse(ENV_ID, &metadata).await.unwrap();
        assert_eq!(env.properties.instance_url(), Some(server.url().as_str()));
        provisioning.assert_async().await;
    }

    #[tokio::test]
    async fn default_currency_comes_from_dataverse() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock(
                "GET",
                format!("/providers/Microsoft.BusinessAppPlatform/scopes/admin/environments/{}", ENV_ID).as_str(),
            )
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(environment_body(&server.url(), "Ready"))
            .create_async()
            .await;
        let _orgs = server
            .mock("GET", "/api/data/v9.2/organizations")
            .with_status(200)
            .with_body(r#"{"value":[{"_basecurrencyid_value":"cur-1"}]}"#)
            .create_async()
            .await;
        let _currencies = server
            .mock("GET", "/api/data/v9.2/transactioncurrencies")
            .match_query(Matcher::UrlEncoded(
                "$filter".into(),
                "transactioncurrencyid eq cur-1".into(),
            ))
            .with_status(200)
            .with_body(r#"{"value":[{"isocurrencycode":"EUR","transactioncurrencyid":"cur-1"}]}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let currency = client.environments().get_default_currency(ENV_ID).await.unwrap();
        assert_eq!(currency.iso_currency_code, "EUR");
    }
}
