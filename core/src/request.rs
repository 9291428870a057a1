//! Request shapes and normalization.
//!
//! Producers may describe a request in several ways: a bare resource string, a
//! structured [`RequestDescriptor`] (optionally wrapping a transport-native
//! [`NativeRequest`]), or an already-normalized [`RequestRecord`]. [`normalize`]
//! turns all of them into a canonical `RequestRecord` with a derived
//! [`RequestKey`].
//!
//! Normalization is pure: no I/O, and caller-owned data is never mutated
//! (inputs are taken by value and copied into the record).
//!
//! # Example
//!
//! ```
//! use composable_fetch_core::request::{normalize, RequestDescriptor, RequestInput};
//!
//! let plain = normalize(RequestInput::from("http://api.test/users")).unwrap();
//! assert_eq!(plain.key(), "http://api.test/users");
//!
//! let keyed = normalize(RequestDescriptor::new("http://api.test/users").with_key("users").into()).unwrap();
//! assert_eq!(keyed.key(), "users");
//! assert_eq!(keyed.resource(), "http://api.test/users");
//! ```

use crate::error::FetchError;
use crate::key::RequestKey;
use crate::namespace::{Namespace, ScopeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport-specific request parameters.
///
/// Opaque to the multiplexer: it is carried through to the transport untouched.
/// The HTTP transport reads `method`, `headers` and `body` from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestOptions(Value);

impl RequestOptions {
    /// Wrap a JSON value as transport options.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// The underlying value.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Look up a top-level field, if the options are an object.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Unwrap into the underlying value.
    #[must_use]
    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for RequestOptions {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A transport-native request object nested inside a descriptor.
///
/// When present, its `url` takes precedence over the descriptor's own `url`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NativeRequest {
    /// Target resource of the native request
    pub url: String,

    /// Options baked into the native request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
}

impl NativeRequest {
    /// Create a native request for `url` with no options.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: None,
        }
    }

    /// Attach options to the native request.
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Structured, not yet normalized, request description.
///
/// Every field is optional; normalization decides whether the combination is
/// usable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Target resource, used when no nested request is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Nested transport-native request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<NativeRequest>,

    /// Transport options (`init` is accepted as an alias)
    #[serde(default, alias = "init", skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,

    /// Explicit correlation key; defaults to the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Isolation scopes applied so far
    #[serde(default, skip_serializing_if = "Namespace::is_empty")]
    pub namespace: Namespace,
}

impl RequestDescriptor {
    /// Descriptor targeting `url` directly.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Descriptor wrapping a native request.
    #[must_use]
    pub fn from_native(input: NativeRequest) -> Self {
        Self {
            input: Some(input),
            ..Self::default()
        }
    }

    /// Set an explicit correlation key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set transport options.
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// The resource normalization would extract: the nested request's URL if
    /// present and non-empty, else the descriptor's own URL.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.input
            .as_ref()
            .map(|input| input.url.as_str())
            .filter(|url| !url.is_empty())
            .or(self.url.as_deref())
    }

    fn normalize(self) -> Result<RequestRecord, FetchError> {
        let resource = match self.resource() {
            Some(resource) if !resource.is_empty() => resource.to_string(),
            Some(_) => return Err(FetchError::invalid_shape("request resource is empty")),
            None => {
                return Err(FetchError::invalid_shape(
                    "request has neither `url` nor `input.url`",
                ));
            }
        };

        let key = match self.key {
            Some(key) if !key.is_empty() => RequestKey::from(key),
            _ => RequestKey::new(resource.clone()),
        };

        Ok(RequestRecord {
            resource,
            input: self.input,
            options: self.options,
            key,
            namespace: self.namespace,
        })
    }
}

/// Any accepted request shape.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestInput {
    /// A bare resource locator
    Url(String),

    /// A structured request description
    Descriptor(RequestDescriptor),

    /// A request that has already been normalized
    Record(RequestRecord),
}

impl RequestInput {
    /// Interpret dynamically typed input.
    ///
    /// JSON strings are resources, JSON objects are descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidRequestShape`] for any other JSON type or for
    /// an object whose fields do not match [`RequestDescriptor`].
    pub fn from_value(value: Value) -> Result<Self, FetchError> {
        match value {
            Value::String(url) => Ok(Self::Url(url)),
            Value::Object(_) => serde_json::from_value::<RequestDescriptor>(value)
                .map(Self::Descriptor)
                .map_err(|e| FetchError::invalid_shape(e.to_string())),
            other => Err(FetchError::invalid_shape(format!(
                "expected a string or an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// The resource this input would normalize to, if it has one.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Descriptor(descriptor) => descriptor.resource(),
            Self::Record(record) => Some(record.resource()),
        }
    }

    /// Copy-on-tag: append `scope` to this request's namespace.
    ///
    /// Bare strings are promoted to descriptors so they can carry a namespace.
    #[must_use]
    pub fn with_scope(self, scope: ScopeId) -> Self {
        match self {
            Self::Url(url) => Self::Descriptor(RequestDescriptor {
                url: Some(url),
                namespace: Namespace::empty().with_scope(scope),
                ..RequestDescriptor::default()
            }),
            Self::Descriptor(mut descriptor) => {
                descriptor.namespace = descriptor.namespace.with_scope(scope);
                Self::Descriptor(descriptor)
            }
            Self::Record(record) => Self::Record(record.with_scope(scope)),
        }
    }
}

impl From<&str> for RequestInput {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for RequestInput {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<RequestDescriptor> for RequestInput {
    fn from(descriptor: RequestDescriptor) -> Self {
        Self::Descriptor(descriptor)
    }
}

impl From<RequestRecord> for RequestInput {
    fn from(record: RequestRecord) -> Self {
        Self::Record(record)
    }
}

impl TryFrom<Value> for RequestInput {
    type Error = FetchError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Canonical, normalized request.
///
/// The key is non-empty and fixed for the lifetime of the record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestRecord {
    resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<NativeRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<RequestOptions>,
    key: RequestKey,
    namespace: Namespace,
}

impl RequestRecord {
    /// The extracted target resource.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The correlation key.
    #[must_use]
    pub const fn key(&self) -> &RequestKey {
        &self.key
    }

    /// The nested native request, if the input carried one.
    #[must_use]
    pub const fn input(&self) -> Option<&NativeRequest> {
        self.input.as_ref()
    }

    /// Options given explicitly on the request.
    #[must_use]
    pub const fn options(&self) -> Option<&RequestOptions> {
        self.options.as_ref()
    }

    /// Options handed to the transport: explicit options win over the nested
    /// request's own.
    #[must_use]
    pub fn transport_options(&self) -> Option<&RequestOptions> {
        self.options
            .as_ref()
            .or_else(|| self.input.as_ref().and_then(|input| input.options.as_ref()))
    }

    /// Isolation scopes applied to this request.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// A copy of this record with `scope` appended to its namespace.
    #[must_use]
    pub fn with_scope(&self, scope: ScopeId) -> Self {
        Self {
            namespace: self.namespace.with_scope(scope),
            ..self.clone()
        }
    }
}

impl From<RequestRecord> for RequestDescriptor {
    fn from(record: RequestRecord) -> Self {
        Self {
            url: Some(record.resource),
            input: record.input,
            options: record.options,
            key: Some(record.key.into_inner()),
            namespace: record.namespace,
        }
    }
}

/// Normalize any accepted request shape into a [`RequestRecord`].
///
/// - A bare string becomes both the resource and the key.
/// - A descriptor's resource is its nested request's URL, else its own URL;
///   its key is the explicit key when non-empty, else that resource.
/// - A record is returned unchanged.
///
/// # Errors
///
/// Returns [`FetchError::InvalidRequestShape`] when no non-empty resource can be
/// extracted.
pub fn normalize(input: RequestInput) -> Result<RequestRecord, FetchError> {
    match input {
        RequestInput::Url(url) => RequestDescriptor::new(url).normalize(),
        RequestInput::Descriptor(descriptor) => descriptor.normalize(),
        RequestInput::Record(record) => Ok(record),
    }
}

/// Normalize dynamically typed input.
///
/// # Errors
///
/// Returns [`FetchError::InvalidRequestShape`] if the value is neither a string
/// nor a well-formed request object.
pub fn normalize_value(value: Value) -> Result<RequestRecord, FetchError> {
    normalize(RequestInput::from_value(value)?)
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
