//! Multi-step API workflows with guaranteed teardown.
//!
//! A [`Workflow`] is an ordered list of [`WorkflowStep`]s. Each step sends
//! one request, checks the status class and the response body, and may bind
//! values into the [`WorkflowContext`] for later steps. A step that creates
//! a remote resource registers it together with its cleanup step; once the
//! workflow stops, for whatever reason, every registered resource is cleaned
//! up in reverse creation order. A cleanup that cannot be verified is a leak:
//! logged at `error` and listed in the [`WorkflowReport`].
//!
//! ```text
//! Pending ──► Executing(0) ──► Executing(1) ──► ... ──► Completed
//!                  │                │
//!                  └────────────────┴──────────────────► Failed(i)
//!                          (cleanup runs on every exit)
//! ```

use crate::network::HttpMethod;
use crate::result::{ErrorKind, SondarError, SondarResult};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default per-request timeout (30 seconds)
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// STATUS CLASS
// =============================================================================

/// Expected HTTP status: a class (`2xx`) or an exact code (`201`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StatusClass {
    /// 1xx
    Informational,
    /// 2xx
    Success,
    /// 3xx
    Redirection,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
    /// One specific code
    Exact(u16),
}

impl StatusClass {
    /// Whether a status satisfies this expectation
    #[must_use]
    pub const fn matches(&self, status: u16) -> bool {
        match self {
            Self::Informational => status >= 100 && status < 200,
            Self::Success => status >= 200 && status < 300,
            Self::Redirection => status >= 300 && status < 400,
            Self::ClientError => status >= 400 && status < 500,
            Self::ServerError => status >= 500 && status < 600,
            Self::Exact(code) => status == *code,
        }
    }

    /// Parse `"2xx"` or `"201"`
    ///
    /// # Errors
    ///
    /// [`SondarError::InvalidPredicate`] for anything else.
    pub fn parse(s: &str) -> SondarResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1xx" => Ok(Self::Informational),
            "2xx" => Ok(Self::Success),
            "3xx" => Ok(Self::Redirection),
            "4xx" => Ok(Self::ClientError),
            "5xx" => Ok(Self::ServerError),
            other => match other.parse::<u16>() {
                Ok(code) if (100..600).contains(&code) => Ok(Self::Exact(code)),
                _ => Err(SondarError::invalid_predicate(format!(
                    "invalid status class {s:?}"
                ))),
            },
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Informational => f.write_str("1xx"),
            Self::Success => f.write_str("2xx"),
            Self::Redirection => f.write_str("3xx"),
            Self::ClientError => f.write_str("4xx"),
            Self::ServerError => f.write_str("5xx"),
            Self::Exact(code) => write!(f, "{code}"),
        }
    }
}

impl TryFrom<String> for StatusClass {
    type Error = SondarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StatusClass> for String {
    fn from(value: StatusClass) -> Self {
        value.to_string()
    }
}

// =============================================================================
// CREDENTIALS & CONTEXT
// =============================================================================

/// Where a bearer token comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Credential {
    /// Read from an environment variable at step execution
    Env {
        /// Variable name
        var: String,
    },
}

impl Credential {
    /// Token from an environment variable
    #[must_use]
    pub fn env(var: impl Into<String>) -> Self {
        Self::Env { var: var.into() }
    }

    /// Resolve the token
    ///
    /// # Errors
    ///
    /// [`SondarError::Config`] if the variable is unset or empty.
    pub fn resolve(&self) -> SondarResult<String> {
        match self {
            Self::Env { var } => match std::env::var(var) {
                Ok(token) if !token.trim().is_empty() => Ok(token),
                _ => Err(SondarError::config(format!(
                    "credential variable {var} is not set"
                ))),
            },
        }
    }
}

/// Named JSON values shared between steps
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowContext {
    values: BTreeMap<String, Value>,
}

impl WorkflowContext {
    /// Empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with a fresh `run_id` (UUID v4) and `timestamp` (ms)
    #[must_use]
    pub fn seeded() -> Self {
        Self::new()
            .with("run_id", Value::String(uuid::Uuid::new_v4().to_string()))
            .with("timestamp", Value::from(chrono::Utc::now().timestamp_millis()))
    }

    /// Bind a value (builder form)
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind(name, value);
        self
    }

    /// Bind a value
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Substitute `{name}` placeholders in a string
    ///
    /// Braces not enclosing an identifier are kept literally.
    ///
    /// # Errors
    ///
    /// [`SondarError::Config`] for a placeholder with no binding.
    pub fn render(&self, template: &str) -> SondarResult<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if is_identifier(&after[..close]) => {
                    let name = &after[..close];
                    let value = self.get(name).ok_or_else(|| {
                        SondarError::config(format!("unbound placeholder {{{name}}} in {template:?}"))
                    })?;
                    out.push_str(&value_text(value));
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Substitute placeholders in every string of a JSON template
    ///
    /// A string that is exactly one placeholder takes the bound value with
    /// its JSON type.
    ///
    /// # Errors
    ///
    /// See [`render`](Self::render).
    pub fn render_json(&self, template: &Value) -> SondarResult<Value> {
        Ok(match template {
            Value::String(s) => {
                let whole = s
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .filter(|name| is_identifier(name))
                    .and_then(|name| self.get(name));
                match whole {
                    Some(value) => value.clone(),
                    None => Value::String(self.render(s)?),
                }
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.render_json(v))
                    .collect::<SondarResult<_>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| self.render_json(v).map(|v| (k.clone(), v)))
                    .collect::<SondarResult<_>>()?,
            ),
            other => other.clone(),
        })
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// RESPONSE CHECKS
// =============================================================================

/// Assertion over a JSON response body, addressed by JSON pointer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum JsonCheck {
    /// Pointer resolves to a non-null value
    Exists {
        /// JSON pointer
        pointer: String,
    },
    /// Pointer resolves to exactly this value
    Equals {
        /// JSON pointer
        pointer: String,
        /// Expected value
        value: Value,
    },
    /// String at pointer contains a substring (case-sensitive)
    Contains {
        /// JSON pointer
        pointer: String,
        /// Needle
        needle: String,
    },
    /// Pointer resolves to a non-empty array
    NonEmptyArray {
        /// JSON pointer
        pointer: String,
    },
    /// Number (or numeric string) at pointer exceeds a threshold
    GreaterThan {
        /// JSON pointer
        pointer: String,
        /// Exclusive lower bound
        threshold: f64,
    },
    /// Some element of the array at pointer has a field containing any needle
    /// (case-insensitive)
    AnyItemContains {
        /// JSON pointer to an array
        pointer: String,
        /// Field of each element
        field: String,
        /// Accepted substrings
        needles: Vec<String>,
    },
}

impl JsonCheck {
    /// Pointer resolves to a non-null value
    #[must_use]
    pub fn exists(pointer: impl Into<String>) -> Self {
        Self::Exists {
            pointer: pointer.into(),
        }
    }

    /// Pointer equals a value
    #[must_use]
    pub fn equals(pointer: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            pointer: pointer.into(),
            value: value.into(),
        }
    }

    /// String at pointer contains a needle
    #[must_use]
    pub fn contains(pointer: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains {
            pointer: pointer.into(),
            needle: needle.into(),
        }
    }

    /// Array at pointer is non-empty
    #[must_use]
    pub fn non_empty_array(pointer: impl Into<String>) -> Self {
        Self::NonEmptyArray {
            pointer: pointer.into(),
        }
    }

    /// Number at pointer exceeds a threshold
    #[must_use]
    pub fn greater_than(pointer: impl Into<String>, threshold: f64) -> Self {
        Self::GreaterThan {
            pointer: pointer.into(),
            threshold,
        }
    }

    /// Any array element's field contains any needle
    #[must_use]
    pub fn any_item_contains<I, S>(pointer: impl Into<String>, field: impl Into<String>, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyItemContains {
            pointer: pointer.into(),
            field: field.into(),
            needles: needles.into_iter().map(Into::into).collect(),
        }
    }

    /// Evaluate against a body, describing the mismatch on failure
    ///
    /// # Errors
    ///
    /// A human-readable reason when the check does not hold.
    pub fn evaluate(&self, body: &Value) -> Result<(), String> {
        let at = |pointer: &str| body.pointer(pointer).filter(|v| !v.is_null());
        match self {
            Self::Exists { pointer } => at(pointer)
                .map(|_| ())
                .ok_or_else(|| format!("{pointer} is missing")),
            Self::Equals { pointer, value } => match body.pointer(pointer) {
                Some(actual) if actual == value => Ok(()),
                Some(actual) => Err(format!("{pointer} is {actual}, expected {value}")),
                None => Err(format!("{pointer} is missing, expected {value}")),
            },
            Self::Contains { pointer, needle } => match at(pointer) {
                Some(Value::String(s)) if s.contains(needle.as_str()) => Ok(()),
                Some(actual) => Err(format!("{pointer} is {actual}, expected to contain {needle:?}")),
                None => Err(format!("{pointer} is missing")),
            },
            Self::NonEmptyArray { pointer } => match at(pointer) {
                Some(Value::Array(items)) if !items.is_empty() => Ok(()),
                Some(Value::Array(_)) => Err(format!("{pointer} is an empty array")),
                Some(other) => Err(format!("{pointer} is not an array: {other}")),
                None => Err(format!("{pointer} is missing")),
            },
            Self::GreaterThan { pointer, threshold } => {
                let number = at(pointer).and_then(|v| match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                });
                match number {
                    Some(n) if n > *threshold => Ok(()),
                    Some(n) => Err(format!("{pointer} is {n}, expected > {threshold}")),
                    None => Err(format!("{pointer} is not a number")),
                }
            }
            Self::AnyItemContains {
                pointer,
                field,
                needles,
            } => {
                let Some(Value::Array(items)) = at(pointer) else {
                    return Err(format!("{pointer} is not an array"));
                };
                let needles: Vec<String> = needles.iter().map(|n| n.to_lowercase()).collect();
                let hit = items.iter().any(|item| {
                    item.get(field)
                        .and_then(Value::as_str)
                        .map(str::to_lowercase)
                        .is_some_and(|v| needles.iter().any(|n| v.contains(n.as_str())))
                });
                if hit {
                    Ok(())
                } else {
                    Err(format!(
                        "no element of {pointer} has {field} containing any of {needles:?}"
                    ))
                }
            }
        }
    }
}

// =============================================================================
// STEPS
// =============================================================================

/// A step that creates a remote resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    /// Resource kind, for reports ("user", "post")
    pub kind: String,
    /// JSON pointer to the assigned id in the creation response
    pub id_pointer: String,
    /// Step that deletes the resource; `{id}` is bound to the assigned id
    pub cleanup: Box<WorkflowStep>,
}

/// One request of a workflow
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    /// Step name
    pub name: String,
    /// Method
    pub method: HttpMethod,
    /// URL template
    pub endpoint: String,
    /// Bearer token source
    pub credential: Option<Credential>,
    /// Extra headers (values are templates)
    pub headers: BTreeMap<String, String>,
    /// Body template
    pub body: Option<RequestBody>,
    /// Expected status
    pub expect: StatusClass,
    /// Body checks, evaluated in order
    pub checks: Vec<JsonCheck>,
    /// Context bindings: name to JSON pointer
    pub bindings: Vec<(String, String)>,
    /// Resource-creation declaration
    pub creates: Option<ResourceSpec>,
    /// Per-step timeout override
    pub timeout: Option<Duration>,
}

impl WorkflowStep {
    /// Create a step expecting `2xx`
    #[must_use]
    pub fn new(name: impl Into<String>, method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            endpoint: endpoint.into(),
            credential: None,
            headers: BTreeMap::new(),
            body: None,
            expect: StatusClass::Success,
            checks: Vec::new(),
            bindings: Vec::new(),
            creates: None,
            timeout: None,
        }
    }

    /// GET step
    #[must_use]
    pub fn get(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Get, endpoint)
    }

    /// POST step
    #[must_use]
    pub fn post(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Post, endpoint)
    }

    /// PUT step
    #[must_use]
    pub fn put(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Put, endpoint)
    }

    /// DELETE step
    #[must_use]
    pub fn delete(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Delete, endpoint)
    }

    /// Set the expected status
    #[must_use]
    pub const fn expect(mut self, status: StatusClass) -> Self {
        self.expect = status;
        self
    }

    /// Set the bearer credential
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set a JSON body template
    #[must_use]
    pub fn with_json(mut self, value: Value) -> Self {
        self.body = Some(RequestBody::Json { value });
        self
    }

    /// Set a text body template
    #[must_use]
    pub fn with_text(mut self, content_type: impl Into<String>, text: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text {
            content_type: content_type.into(),
            text: text.into(),
        });
        self
    }

    /// Add a body check
    #[must_use]
    pub fn check(mut self, check: JsonCheck) -> Self {
        self.checks.push(check);
        self
    }

    /// Bind a response value into the context
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, pointer: impl Into<String>) -> Self {
        self.bindings.push((name.into(), pointer.into()));
        self
    }

    /// Declare that this step creates a resource
    #[must_use]
    pub fn creates(
        mut self,
        kind: impl Into<String>,
        id_pointer: impl Into<String>,
        cleanup: WorkflowStep,
    ) -> Self {
        self.creates = Some(ResourceSpec {
            kind: kind.into(),
            id_pointer: id_pointer.into(),
            cleanup: Box::new(cleanup),
        });
        self
    }

    /// Override the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn request(&self, ctx: &WorkflowContext) -> SondarResult<HttpRequest> {
        let mut request = HttpRequest::new(self.method, ctx.render(&self.endpoint)?);
        for (name, value) in &self.headers {
            request = request.with_header(name.clone(), ctx.render(value)?);
        }
        if let Some(credential) = &self.credential {
            request = request.with_bearer(credential.resolve()?);
        }
        request.body = match &self.body {
            Some(RequestBody::Json { value }) => Some(RequestBody::Json {
                value: ctx.render_json(value)?,
            }),
            Some(RequestBody::Text { content_type, text }) => Some(RequestBody::Text {
                content_type: content_type.clone(),
                text: ctx.render(text)?,
            }),
            None => None,
        };
        Ok(request)
    }
}

/// A named, ordered list of steps
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    /// Workflow name
    pub name: String,
    /// Steps
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Create an empty workflow
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }
}

// =============================================================================
// RESOURCES
// =============================================================================

/// A resource created on a remote service, pending cleanup
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResource {
    /// Resource kind
    pub kind: String,
    /// Remote-assigned id
    pub id: Value,
    /// Index of the creating step
    pub created_by: usize,
    /// Cleanup step (`{id}` bound at execution)
    pub cleanup: WorkflowStep,
}

impl fmt::Display for RemoteResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, value_text(&self.id))
    }
}

/// Resources created but not yet cleaned up, shared with the scenario
/// runner so an aborted scenario can still report them
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    inner: Arc<Mutex<Vec<RemoteResource>>>,
}

impl ResourceLedger {
    /// Empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a created resource
    pub fn record(&self, resource: RemoteResource) {
        if let Ok(mut entries) = self.inner.lock() {
            entries.push(resource);
        }
    }

    /// Remove a resource whose cleanup was verified
    pub fn release(&self, resource: &RemoteResource) {
        if let Ok(mut entries) = self.inner.lock() {
            if let Some(pos) = entries
                .iter()
                .position(|r| r.kind == resource.kind && r.id == resource.id)
            {
                entries.remove(pos);
            }
        }
    }

    /// Resources still outstanding
    #[must_use]
    pub fn outstanding(&self) -> Vec<RemoteResource> {
        self.inner.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Whether nothing is outstanding
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().map(|e| e.is_empty()).unwrap_or(true)
    }
}

/// Leak entry for a resource created without an id to clean it up by
fn untracked_leak(kind: &str, pointer: &str) -> String {
    format!("{kind} (id missing at {pointer})")
}

// =============================================================================
// REPORT
// =============================================================================

/// Workflow execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum WorkflowState {
    /// Not started
    Pending,
    /// Running step `i`
    Executing(usize),
    /// All steps succeeded
    Completed,
    /// Step `i` failed
    Failed(usize),
}

/// Record of one executed step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Step index
    pub index: usize,
    /// Step name
    pub name: String,
    /// Method
    pub method: HttpMethod,
    /// Rendered URL, if rendering succeeded
    pub url: Option<String>,
    /// Response status, if a response arrived
    pub status: Option<u16>,
    /// Whether the step succeeded
    pub passed: bool,
    /// Wall time
    pub duration_ms: u64,
}

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    /// Step index
    pub index: usize,
    /// Step name
    pub name: String,
    /// What was expected
    pub expected: String,
    /// What happened
    pub actual: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {} ({}): expected {}, got {}",
            self.index, self.name, self.expected, self.actual
        )
    }
}

/// Record of one cleanup attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupRecord {
    /// Resource description
    pub resource: String,
    /// Response status, if any
    pub status: Option<u16>,
    /// Whether the cleanup's expected status was observed
    pub verified: bool,
    /// Failure reason
    pub reason: Option<String>,
}

/// Outcome of a workflow run
#[derive(Debug, Serialize)]
pub struct WorkflowReport {
    /// Workflow name
    pub name: String,
    /// Terminal state
    pub state: WorkflowState,
    /// Executed steps
    pub steps: Vec<StepRecord>,
    /// First failure
    pub failure: Option<StepFailure>,
    /// Cleanup attempts, in execution order
    pub cleanups: Vec<CleanupRecord>,
    /// Resources whose cleanup was not verified
    pub leaks: Vec<String>,
    /// Final context
    pub context: WorkflowContext,
    #[serde(skip)]
    error: Option<SondarError>,
}

impl WorkflowReport {
    /// Whether every step passed and every resource was cleaned up
    #[must_use]
    pub fn passed(&self) -> bool {
        self.state == WorkflowState::Completed && self.leaks.is_empty()
    }

    /// Convert into a result
    ///
    /// # Errors
    ///
    /// The failing step's error, or [`SondarError::ResourceLeak`] when all
    /// steps passed but cleanup did not.
    pub fn into_result(mut self) -> SondarResult<Self> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if !self.leaks.is_empty() {
            return Err(SondarError::ResourceLeak {
                resource: self.leaks.join(", "),
                reason: self
                    .cleanups
                    .iter()
                    .filter_map(|c| c.reason.clone())
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }
        Ok(self)
    }

    /// Classification of the failure, if any
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(SondarError::kind)
    }
}

// =============================================================================
// SEQUENCER
// =============================================================================

/// Runs workflows against a transport
#[derive(Debug)]
pub struct Sequencer<'a, T: HttpTransport + ?Sized> {
    transport: &'a T,
    step_timeout: Duration,
    ledger: ResourceLedger,
}

struct StepError {
    failure: StepFailure,
    error: SondarError,
    untracked: Option<String>,
}

impl<'a, T: HttpTransport + ?Sized> Sequencer<'a, T> {
    /// Create a sequencer with the default step timeout and a private ledger
    #[must_use]
    pub fn new(transport: &'a T) -> Self {
        Self {
            transport,
            step_timeout: Duration::from_millis(DEFAULT_STEP_TIMEOUT_MS),
            ledger: ResourceLedger::new(),
        }
    }

    /// Set the default per-step timeout
    #[must_use]
    pub const fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Record created resources in a shared ledger
    #[must_use]
    pub fn with_ledger(mut self, ledger: ResourceLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Execute a workflow, then clean up everything it created
    pub async fn run(&self, workflow: &Workflow, mut ctx: WorkflowContext) -> WorkflowReport {
        let mut state = WorkflowState::Pending;
        let mut steps = Vec::with_capacity(workflow.steps.len());
        let mut created: Vec<RemoteResource> = Vec::new();
        let mut failure = None;
        let mut error = None;
        let mut leaks = Vec::new();
        debug!(workflow = %workflow.name, ?state, "workflow starting");

        for (index, step) in workflow.steps.iter().enumerate() {
            state = WorkflowState::Executing(index);
            info!(workflow = %workflow.name, index, step = %step.name, "executing step");
            let (record, outcome) = self.execute(index, step, &mut ctx, &mut created).await;
            steps.push(record);
            if let Err(e) = outcome {
                warn!(workflow = %workflow.name, failure = %e.failure, "step failed");
                state = WorkflowState::Failed(index);
                leaks.extend(e.untracked);
                failure = Some(e.failure);
                error = Some(e.error);
                break;
            }
        }
        if !matches!(state, WorkflowState::Failed(_)) {
            state = WorkflowState::Completed;
        }

        let mut cleanups = Vec::with_capacity(created.len());
        for resource in created.iter().rev() {
            let record = self.cleanup(resource, &ctx).await;
            if record.verified {
                self.ledger.release(resource);
            } else {
                error!(
                    workflow = %workflow.name,
                    resource = %resource,
                    reason = record.reason.as_deref().unwrap_or("unknown"),
                    "resource leak: cleanup not verified"
                );
                leaks.push(resource.to_string());
            }
            cleanups.push(record);
        }

        info!(workflow = %workflow.name, ?state, leaks = leaks.len(), "workflow finished");
        WorkflowReport {
            name: workflow.name.clone(),
            state,
            steps,
            failure,
            cleanups,
            leaks,
            context: ctx,
            error,
        }
    }

    async fn send(&self, step: &WorkflowStep, request: &HttpRequest) -> SondarResult<HttpResponse> {
        let timeout = step.timeout.unwrap_or(self.step_timeout);
        tokio::time::timeout(timeout, self.transport.send(request))
            .await
            .map_err(|_| {
                SondarError::timeout(
                    format!("{} {}", request.method, request.url),
                    timeout.as_millis() as u64,
                )
            })?
    }

    async fn execute(
        &self,
        index: usize,
        step: &WorkflowStep,
        ctx: &mut WorkflowContext,
        created: &mut Vec<RemoteResource>,
    ) -> (StepRecord, Result<(), StepError>) {
        let start = Instant::now();
        let mut record = StepRecord {
            index,
            name: step.name.clone(),
            method: step.method,
            url: None,
            status: None,
            passed: false,
            duration_ms: 0,
        };
        let fail = |expected: String, actual: String, error: SondarError| StepError {
            failure: StepFailure {
                index,
                name: step.name.clone(),
                expected,
                actual,
            },
            error,
            untracked: None,
        };

        let outcome = async {
            let request = step
                .request(ctx)
                .map_err(|e| fail("a renderable request".into(), e.to_string(), e))?;
            record.url = Some(request.url.clone());

            let response = self
                .send(step, &request)
                .await
                .map_err(|e| fail(format!("status {}", step.expect), e.to_string(), e))?;
            record.status = Some(response.status);

            if !step.expect.matches(response.status) {
                let msg = format!(
                    "step {index} ({}): expected {}, got {} from {} {}",
                    step.name, step.expect, response.status, request.method, request.url
                );
                return Err(fail(
                    format!("status {}", step.expect),
                    format!("status {}", response.status),
                    SondarError::assertion(msg),
                ));
            }

            if let Some(spec) = &step.creates {
                match response.body.pointer(&spec.id_pointer).filter(|v| !v.is_null()) {
                    Some(id) => {
                        let resource = RemoteResource {
                            kind: spec.kind.clone(),
                            id: id.clone(),
                            created_by: index,
                            cleanup: (*spec.cleanup).clone(),
                        };
                        info!(resource = %resource, "resource created");
                        self.ledger.record(resource.clone());
                        created.push(resource);
                    }
                    None => {
                        error!(
                            step = %step.name,
                            pointer = %spec.id_pointer,
                            "created resource has no id; it cannot be cleaned up"
                        );
                        let msg = format!("step {index} ({}): no id at {}", step.name, spec.id_pointer);
                        return Err(StepError {
                            untracked: Some(untracked_leak(&spec.kind, &spec.id_pointer)),
                            ..fail(
                                format!("id at {}", spec.id_pointer),
                                "missing".into(),
                                SondarError::assertion(msg),
                            )
                        });
                    }
                }
            }

            for check in &step.checks {
                if let Err(reason) = check.evaluate(&response.body) {
                    let msg = format!("step {index} ({}): {reason}", step.name);
                    return Err(fail(format!("{check:?}"), reason, SondarError::assertion(msg)));
                }
            }

            for (name, pointer) in &step.bindings {
                match response.body.pointer(pointer) {
                    Some(value) => ctx.bind(name.clone(), value.clone()),
                    None => {
                        let msg = format!("step {index} ({}): cannot bind {name} from {pointer}", step.name);
                        return Err(fail(
                            format!("value at {pointer}"),
                            "missing".into(),
                            SondarError::assertion(msg),
                        ));
                    }
                }
            }
            Ok(())
        }
        .await;

        record.passed = outcome.is_ok();
        record.duration_ms = start.elapsed().as_millis() as u64;
        (record, outcome)
    }

    async fn cleanup(&self, resource: &RemoteResource, ctx: &WorkflowContext) -> CleanupRecord {
        let ctx = ctx.clone().with("id", resource.id.clone());
        let step = &resource.cleanup;
        let mut record = CleanupRecord {
            resource: resource.to_string(),
            status: None,
            verified: false,
            reason: None,
        };

        let request = match step.request(&ctx) {
            Ok(request) => request,
            Err(e) => {
                record.reason = Some(e.to_string());
                return record;
            }
        };
        match self.send(step, &request).await {
            Ok(response) => {
                record.status = Some(response.status);
                record.verified = step.expect.matches(response.status);
                if record.verified {
                    info!(resource = %resource, status = response.status, "resource cleaned up");
                } else {
                    record.reason = Some(format!(
                        "cleanup expected {}, got {}",
                        step.expect, response.status
                    ));
                }
            }
            Err(e) => record.reason = Some(e.to_string()),
        }
        record
    }
}
