//! API workflow scenarios.
//!
//! Vehicle data (NHTSA vPIC), geocoding (Nominatim, Overpass), form
//! submission (JSONPlaceholder) and an authenticated account lifecycle
//! (GoRest). The GoRest token is read from the variable named by
//! `api.token_env` when the step runs; it never appears in configuration.

use super::Harness;
use serde_json::json;
use sondar::{
    Artifact, HarnessConfig, JsonCheck, ScenarioContext, Sequencer, SondarResult, StatusClass,
    Workflow, WorkflowContext, WorkflowStep,
};

const VPIC: &str = "https://vpic.nhtsa.dot.gov/api/vehicles";
const NOMINATIM: &str = "https://nominatim.openstreetmap.org/search";
const OVERPASS: &str = "https://overpass-api.de/api/interpreter";
const JSONPLACEHOLDER: &str = "https://jsonplaceholder.typicode.com";
const GOREST_USERS: &str = "https://gorest.co.in/public/v2/users";

/// Public sample VIN of a 2012 C-Class
const SAMPLE_VIN: &str = "WDDGF4HB1CA660797";

const DEALER_QUERY: &str = r#"[out:json][timeout:25];
area["name"="Stuttgart"]->.searchArea;
node["shop"="car"]["brand"~"Mercedes",i](area.searchArea);
out body;"#;

/// Catalog of API workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiScenario {
    /// Models for the make include a known class
    NhtsaModels,
    /// VIN decodes to the make
    NhtsaVinDecode,
    /// Manufacturer listing is non-empty
    NhtsaManufacturers,
    /// Stuttgart geocodes
    GeocodeStuttgart,
    /// Dealer query returns an element list
    DealerSearch,
    /// Museum coordinates fall in the Stuttgart area
    MuseumCoordinates,
    /// Contact form submission is accepted
    ContactCreate,
    /// Contact request update is echoed
    ContactUpdate,
    /// Authenticated registration, then cleanup
    GorestRegistration,
    /// Registration without a token is rejected
    GorestUnauthorized,
}

impl ApiScenario {
    /// All API scenarios in run order
    pub const ALL: [Self; 10] = [
        Self::NhtsaModels,
        Self::NhtsaVinDecode,
        Self::NhtsaManufacturers,
        Self::GeocodeStuttgart,
        Self::DealerSearch,
        Self::MuseumCoordinates,
        Self::ContactCreate,
        Self::ContactUpdate,
        Self::GorestRegistration,
        Self::GorestUnauthorized,
    ];

    /// Scenario slug
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::NhtsaModels => "nhtsa-models",
            Self::NhtsaVinDecode => "nhtsa-vin-decode",
            Self::NhtsaManufacturers => "nhtsa-manufacturers",
            Self::GeocodeStuttgart => "geocode-stuttgart",
            Self::DealerSearch => "dealer-search",
            Self::MuseumCoordinates => "museum-coordinates",
            Self::ContactCreate => "contact-create",
            Self::ContactUpdate => "contact-update",
            Self::GorestRegistration => "gorest-registration",
            Self::GorestUnauthorized => "gorest-unauthorized",
        }
    }

    /// One-line description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::NhtsaModels => "model list includes C-Class, E-Class, S-Class or GLE",
            Self::NhtsaVinDecode => "sample VIN decodes to MERCEDES",
            Self::NhtsaManufacturers => "manufacturer list is non-empty",
            Self::GeocodeStuttgart => "Stuttgart geocodes to a named place",
            Self::DealerSearch => "Overpass dealer query answers with elements",
            Self::MuseumCoordinates => "museum lies at lat > 48, lon > 9",
            Self::ContactCreate => "contact form POST returns 201 with an id",
            Self::ContactUpdate => "contact PUT echoes the confirmed status",
            Self::GorestRegistration => "register a user with a token, then delete it",
            Self::GorestUnauthorized => "register without a token is rejected with 401",
        }
    }

    /// The workflow this scenario runs
    #[must_use]
    pub fn workflow(self, config: &HarnessConfig) -> Workflow {
        let workflow = Workflow::new(self.slug());
        match self {
            Self::NhtsaModels => workflow.step(
                WorkflowStep::get(
                    "models for make",
                    format!("{VPIC}/GetModelsForMake/mercedes?format=json"),
                )
                .expect(StatusClass::Exact(200))
                .check(JsonCheck::non_empty_array("/Results"))
                .check(JsonCheck::any_item_contains(
                    "/Results",
                    "Model_Name",
                    ["C-Class", "E-Class", "S-Class", "GLE"],
                )),
            ),
            Self::NhtsaVinDecode => workflow.step(
                WorkflowStep::get(
                    "decode vin",
                    format!("{VPIC}/DecodeVinValues/{SAMPLE_VIN}?format=json"),
                )
                .expect(StatusClass::Exact(200))
                .check(JsonCheck::non_empty_array("/Results"))
                .check(JsonCheck::contains("/Results/0/Make", "MERCEDES")),
            ),
            Self::NhtsaManufacturers => workflow.step(
                WorkflowStep::get(
                    "manufacturers",
                    format!("{VPIC}/GetAllManufacturers?format=json&page=1"),
                )
                .expect(StatusClass::Exact(200))
                .check(JsonCheck::non_empty_array("/Results")),
            ),
            Self::GeocodeStuttgart => workflow.step(
                WorkflowStep::get(
                    "geocode",
                    format!("{NOMINATIM}?q=Stuttgart,Germany&format=json&limit=1"),
                )
                .expect(StatusClass::Exact(200))
                .check(JsonCheck::non_empty_array(""))
                .check(JsonCheck::contains("/0/display_name", "Stuttgart")),
            ),
            Self::DealerSearch => workflow.step(
                WorkflowStep::post("dealer query", OVERPASS)
                    .with_text("text/plain", DEALER_QUERY)
                    .expect(StatusClass::Exact(200))
                    .check(JsonCheck::exists("/elements")),
            ),
            Self::MuseumCoordinates => workflow.step(
                WorkflowStep::get(
                    "geocode museum",
                    format!("{NOMINATIM}?q=Mercedes-Benz+Museum+Stuttgart&format=json&limit=1"),
                )
                .expect(StatusClass::Exact(200))
                .check(JsonCheck::greater_than("/0/lat", 48.0))
                .check(JsonCheck::greater_than("/0/lon", 9.0)),
            ),
            Self::ContactCreate => workflow.step(
                WorkflowStep::post("submit contact form", format!("{JSONPLACEHOLDER}/posts"))
                    .with_json(json!({
                        "name": "Test Customer",
                        "email": "customer@test.com",
                        "subject": "Test Drive Request",
                        "message": "I would like to schedule a test drive for the new E-Class",
                        "preferredDealer": "Stuttgart-Mitte",
                        "vehicleInterest": "E-Class 2024",
                    }))
                    .expect(StatusClass::Exact(201))
                    .check(JsonCheck::exists("/id")),
            ),
            Self::ContactUpdate => workflow.step(
                WorkflowStep::put("update contact request", format!("{JSONPLACEHOLDER}/posts/1"))
                    .with_json(json!({
                        "id": 1,
                        "name": "Test Customer Updated",
                        "email": "customer.updated@test.com",
                        "subject": "Updated: Test Drive Request",
                        "status": "confirmed",
                    }))
                    .expect(StatusClass::Exact(200))
                    .check(JsonCheck::equals("/status", "confirmed")),
            ),
            Self::GorestRegistration => {
                let credential = config.api.credential();
                workflow.step(
                    WorkflowStep::post("register customer", GOREST_USERS)
                        .with_credential(credential.clone())
                        .with_json(json!({
                            "name": "Mercedes Test Customer",
                            "email": "mercedes.customer.{timestamp}@test.com",
                            "gender": "female",
                            "status": "active",
                        }))
                        .expect(StatusClass::Exact(201))
                        .creates(
                            "user",
                            "/id",
                            WorkflowStep::delete("delete customer", format!("{GOREST_USERS}/{{id}}"))
                                .with_credential(credential)
                                .expect(StatusClass::Exact(204)),
                        )
                        .check(JsonCheck::exists("/id"))
                        .check(JsonCheck::equals("/name", "Mercedes Test Customer")),
                )
            }
            Self::GorestUnauthorized => workflow.step(
                WorkflowStep::post("register without token", GOREST_USERS)
                    .with_json(json!({
                        "name": "Unauthorized User",
                        "email": "unauth.{timestamp}@test.com",
                        "gender": "male",
                        "status": "active",
                    }))
                    .expect(StatusClass::Exact(401)),
            ),
        }
    }

    /// Run the workflow, cleaning up whatever it created
    ///
    /// # Errors
    ///
    /// The first failed step, or [`sondar::SondarError::ResourceLeak`] when
    /// cleanup could not be verified.
    pub async fn run(self, harness: &Harness<'_>, ctx: &ScenarioContext) -> SondarResult<()> {
        let workflow = self.workflow(harness.config);
        let report = Sequencer::new(harness.http)
            .with_step_timeout(harness.config.api.request_timeout())
            .with_ledger(ctx.ledger())
            .run(&workflow, WorkflowContext::seeded())
            .await;
        for step in &report.steps {
            let status = step
                .status
                .map_or_else(|| "no response".to_string(), |s| s.to_string());
            ctx.note(format!("{} {}: {status}", step.method, step.name));
        }
        for cleanup in &report.cleanups {
            ctx.note(format!(
                "cleanup {}: {}",
                cleanup.resource,
                if cleanup.verified { "verified" } else { "not verified" }
            ));
        }
        let tracked: Vec<String> = ctx.ledger().outstanding().iter().map(ToString::to_string).collect();
        for leak in report.leaks.iter().filter(|l| !tracked.contains(l)) {
            ctx.attach(Artifact::Leak {
                resource: leak.clone(),
                reason: "created without a usable id; cannot be cleaned up".into(),
            });
        }
        report.into_result().map(drop)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pages::ScriptedLauncher;
    use sondar::{ApiConfig, HttpMethod, MockDriver, MockTransport, SondarError, UrlPattern};

    fn fixtures() -> MockTransport {
        MockTransport::new()
            .with_fixture(
                HttpMethod::Get,
                UrlPattern::Contains("GetModelsForMake".into()),
                200,
                json!({"Count": 2, "Results": [
                    {"Model_Name": "SLK-Class"},
                    {"Model_Name": "E-Class"},
                ]}),
            )
            .with_fixture(
                HttpMethod::Get,
                UrlPattern::Contains("DecodeVinValues".into()),
                200,
                json!({"Results": [{"Make": "MERCEDES-BENZ", "Model": "C-Class", "ModelYear": "2012"}]}),
            )
            .with_fixture(
                HttpMethod::Get,
                UrlPattern::Contains("GetAllManufacturers".into()),
                200,
                json!({"Results": [{"Mfr_Name": "MERCEDES-BENZ AG"}]}),
            )
            .with_fixture(
                HttpMethod::Get,
                UrlPattern::Contains("q=Stuttgart".into()),
                200,
                json!([{"display_name": "Stuttgart, Baden-Württemberg, Deutschland", "lat": "48.7784", "lon": "9.1800"}]),
            )
            .with_fixture(
                HttpMethod::Get,
                UrlPattern::Contains("Museum".into()),
                200,
                json!([{"display_name": "Mercedes-Benz Museum", "lat": "48.7880", "lon": "9.2335"}]),
            )
            .with_fixture(HttpMethod::Post, UrlPattern::Prefix(OVERPASS.into()), 200, json!({"elements": []}))
    }

    async fn run_with(
        scenario: ApiScenario,
        config: &HarnessConfig,
        http: &MockTransport,
    ) -> (SondarResult<()>, ScenarioContext) {
        let launcher = ScriptedLauncher::new(|_| MockDriver::new());
        let harness = Harness::new(config, &launcher, http);
        let ctx = ScenarioContext::new(scenario.slug(), 1);
        (scenario.run(&harness, &ctx).await, ctx)
    }

    fn gorest_config(var: &str) -> HarnessConfig {
        std::env::set_var(var, "test-token");
        HarnessConfig::default().with_api(ApiConfig::default().with_token_env(var))
    }

    mod public_api_tests {
        use super::*;

        #[tokio::test]
        async fn test_public_workflows_pass_on_fixtures() {
            let http = fixtures();
            let config = HarnessConfig::default();
            for scenario in [
                ApiScenario::NhtsaModels,
                ApiScenario::NhtsaVinDecode,
                ApiScenario::NhtsaManufacturers,
                ApiScenario::GeocodeStuttgart,
                ApiScenario::DealerSearch,
                ApiScenario::MuseumCoordinates,
            ] {
                let (result, _) = run_with(scenario, &config, &http).await;
                assert!(result.is_ok(), "{} failed: {result:?}", scenario.slug());
            }
        }

        #[tokio::test]
        async fn test_dealer_query_sent_as_text() {
            let http = fixtures();
            run_with(ApiScenario::DealerSearch, &HarnessConfig::default(), &http)
                .await
                .0
                .unwrap();
            let request = &http.history()[0];
            assert_eq!(request.method, HttpMethod::Post);
            assert!(matches!(
                &request.body,
                Some(sondar::RequestBody::Text { content_type, text })
                    if content_type == "text/plain" && text.contains("searchArea")
            ));
        }

        #[tokio::test]
        async fn test_missing_model_fails() {
            let http = MockTransport::new().with_fixture(
                HttpMethod::Get,
                UrlPattern::Contains("GetModelsForMake".into()),
                200,
                json!({"Results": [{"Model_Name": "Sprinter"}]}),
            );
            let (result, _) = run_with(ApiScenario::NhtsaModels, &HarnessConfig::default(), &http).await;
            assert!(matches!(result, Err(SondarError::AssertionFailed { .. })));
        }

        #[tokio::test]
        async fn test_empty_geocode_result_fails() {
            let http = MockTransport::new().with_fixture(
                HttpMethod::Get,
                UrlPattern::Contains("Museum".into()),
                200,
                json!([]),
            );
            let (result, _) =
                run_with(ApiScenario::MuseumCoordinates, &HarnessConfig::default(), &http).await;
            let err = result.unwrap_err();
            assert!(matches!(err, SondarError::AssertionFailed { .. }));
            assert!(err.to_string().contains("/0/lat is not a number"));
        }

        #[tokio::test]
        async fn test_contact_create_and_update_against_rest_mock() {
            let http = MockTransport::new().with_record("/posts", 1, json!({"status": "new"}));
            let config = HarnessConfig::default();
            run_with(ApiScenario::ContactCreate, &config, &http).await.0.unwrap();
            run_with(ApiScenario::ContactUpdate, &config, &http).await.0.unwrap();
        }
    }

    mod gorest_tests {
        use super::*;

        #[tokio::test]
        async fn test_registration_cleans_up() {
            let config = gorest_config("SONDAR_CATALOG_TOKEN_REGISTRATION");
            let http = MockTransport::new().with_required_token("test-token");
            let (result, ctx) = run_with(ApiScenario::GorestRegistration, &config, &http).await;
            result.unwrap();
            assert!(ctx.ledger().is_empty());
            assert_eq!(http.record_count("/public/v2/users"), 0);

            let history = http.history();
            assert_eq!(history.len(), 2);
            assert_eq!(history[1].method, HttpMethod::Delete);
            assert!(history[1].url.ends_with("/users/42"));
        }

        #[tokio::test]
        async fn test_registration_without_returned_id_reports_leak() {
            let config = gorest_config("SONDAR_CATALOG_TOKEN_IDLESS");
            let http = MockTransport::new().with_fixture(
                HttpMethod::Post,
                UrlPattern::Contains("/users".into()),
                201,
                json!({"name": "Mercedes Test Customer"}),
            );
            let (result, ctx) = run_with(ApiScenario::GorestRegistration, &config, &http).await;
            assert!(matches!(result, Err(SondarError::AssertionFailed { .. })));
            assert_eq!(
                ctx.artifacts()
                    .into_iter()
                    .filter(|a| matches!(a, Artifact::Leak { .. }))
                    .collect::<Vec<_>>(),
                vec![Artifact::Leak {
                    resource: "user (id missing at /id)".into(),
                    reason: "created without a usable id; cannot be cleaned up".into(),
                }]
            );
        }

        #[tokio::test]
        async fn test_registration_without_token_variable_fails() {
            let config = HarnessConfig::default()
                .with_api(ApiConfig::default().with_token_env("SONDAR_CATALOG_TOKEN_UNSET"));
            let http = MockTransport::new().with_required_token("test-token");
            let (result, _) = run_with(ApiScenario::GorestRegistration, &config, &http).await;
            assert!(matches!(result, Err(SondarError::Config { .. })));
            assert!(http.history().is_empty());
        }

        #[tokio::test]
        async fn test_unauthorized_expects_401() {
            let http = MockTransport::new().with_required_token("test-token");
            let (result, _) =
                run_with(ApiScenario::GorestUnauthorized, &HarnessConfig::default(), &http).await;
            result.unwrap();
            assert!(http.history()[0].bearer.is_none());
        }

        #[tokio::test]
        async fn test_open_endpoint_fails_unauthorized_check() {
            let http = MockTransport::new();
            let (result, _) =
                run_with(ApiScenario::GorestUnauthorized, &HarnessConfig::default(), &http).await;
            let err = result.unwrap_err();
            assert!(err.to_string().contains("got 201"));
        }

        #[test]
        fn test_token_never_in_workflow() {
            let config = gorest_config("SONDAR_CATALOG_TOKEN_SERDE");
            let workflow = ApiScenario::GorestRegistration.workflow(&config);
            let debug = format!("{workflow:?}");
            assert!(debug.contains("SONDAR_CATALOG_TOKEN_SERDE"));
            assert!(!debug.contains("test-token"));
        }
    }
}
