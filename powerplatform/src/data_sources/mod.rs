//! Data source implementations

pub mod billing_policies;
pub mod billing_policies_environments;
pub mod connectors;
pub mod currencies;
pub mod environment_powerapps;
pub mod environment_templates;
pub mod environments;
pub mod languages;
pub mod locations;
pub mod solution_checker_rules;
pub mod tenant;
pub mod tenant_capacity;

pub use billing_policies::BillingPoliciesDataSource;
pub use billing_policies_environments::BillingPoliciesEnvironmentsDataSource;
pub use connectors::ConnectorsDataSource;
pub use currencies::CurrenciesDataSource;
pub use environment_powerapps::EnvironmentPowerAppsDataSource;
pub use environment_templates::EnvironmentTemplatesDataSource;
pub use environments::EnvironmentsDataSource;
pub use languages::LanguagesDataSource;
pub use locations::LocationsDataSource;
pub use solution_checker_rules::SolutionCheckerRulesDataSource;
pub use tenant::TenantDataSource;
pub use tenant_capacity::TenantCapacityDataSource;
