//! `reqwest`-backed connector for JSON APIs.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::connector::{
    ApiRequest, ConnectionOptions, Connector, ConnectorFactory, scalar_to_string,
};
use crate::error::RequestError;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// HTTP client bound to one API.
///
/// Paths are appended to the base URL segment by segment; `:name` segments
/// are filled from `params` and the remaining params become query arguments.
/// Responses are JSON envelopes: the payload sits under the data key and
/// failures under the error key (see [`ConnectionOptions`]). A response
/// without the data key is returned unchanged.
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    base_url: Url,
    options: ConnectionOptions,
}

impl core::fmt::Debug for HttpConnector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HttpConnector")
            .field("base_url", &self.base_url.as_str())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl HttpConnector {
    /// Creates a connector from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidOptions`] for an unusable URL or API key.
    pub fn new(options: ConnectionOptions) -> Result<Self, RequestError> {
        let base_url = options.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &options.api_key {
            let mut value = HeaderValue::from_str(api_key).map_err(|err| {
                RequestError::InvalidOptions(format!("invalid api key header: {err}"))
            })?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if !options.keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }
        let client = builder
            .build()
            .map_err(|err| RequestError::InvalidOptions(err.to_string()))?;

        Ok(Self {
            client,
            base_url,
            options,
        })
    }

    /// The resolved base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `request` to a full URL.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidRequest`] when a path placeholder has
    /// no matching param.
    pub fn url_for(&self, request: &ApiRequest) -> Result<Url, RequestError> {
        let mut url = self.base_url.clone();
        let mut params = request.params.clone();

        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                RequestError::InvalidOptions(format!(
                    "'{}' cannot be used as a base url",
                    self.base_url
                ))
            })?;
            segments.pop_if_empty();
            for segment in request.path.split('/').filter(|s| !s.is_empty()) {
                match segment.strip_prefix(':') {
                    Some(name) => {
                        let value = params.remove(name).ok_or_else(|| {
                            RequestError::InvalidRequest(format!(
                                "missing path parameter '{name}' for {}",
                                request.path
                            ))
                        })?;
                        segments.push(&scalar_to_string(&value));
                    }
                    None => {
                        segments.push(segment);
                    }
                }
            }
        }

        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(name, value)| (name.clone(), scalar_to_string(value)))
            .collect();
        if !request.method.has_body() {
            query.extend(
                request
                    .args
                    .iter()
                    .map(|(name, value)| (name.clone(), scalar_to_string(value))),
            );
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }

    fn map_send_error(request: &ApiRequest, err: &reqwest::Error) -> RequestError {
        match request.timeout {
            Some(limit) if err.is_timeout() => RequestError::Timeout(limit),
            _ => RequestError::Http(err.to_string()),
        }
    }

    /// Interprets a response body according to the envelope options.
    fn decode(&self, status: StatusCode, body: &[u8]) -> Result<Value, RequestError> {
        let envelope: Value = if body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(body) {
                Ok(value) => value,
                Err(_) if !status.is_success() => {
                    return Err(RequestError::Status {
                        status: status.as_u16(),
                        code: None,
                        message: String::from_utf8_lossy(body).into_owned(),
                    });
                }
                Err(err) => {
                    return Err(RequestError::InvalidResponse(format!(
                        "failed to parse response: {err}"
                    )));
                }
            }
        };

        if let Some(error) = envelope
            .get(self.options.error_key())
            .filter(|error| !error.is_null())
        {
            return Err(envelope_error(status, error));
        }

        if !status.is_success() {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| envelope.to_string(), str::to_string);
            return Err(RequestError::Status {
                status: status.as_u16(),
                code: None,
                message,
            });
        }

        if self.options.log_warnings {
            self.log_warnings(&envelope);
        }

        if self.options.include_meta {
            return Ok(envelope);
        }

        match envelope {
            Value::Object(mut fields) if fields.contains_key(self.options.data_key()) => Ok(fields
                .remove(self.options.data_key())
                .unwrap_or(Value::Null)),
            other => Ok(other),
        }
    }

    fn log_warnings(&self, envelope: &Value) {
        let warnings = envelope
            .pointer("/_meta/warnings")
            .and_then(Value::as_array);
        for warning in warnings.into_iter().flatten() {
            warn!(url = %self.base_url, warning = %scalar_to_string(warning), "upstream warning");
        }
    }
}

fn envelope_error(status: StatusCode, error: &Value) -> RequestError {
    let status = if status.is_success() {
        StatusCode::BAD_GATEWAY.as_u16()
    } else {
        status.as_u16()
    };

    match error {
        Value::Object(fields) => RequestError::Status {
            status,
            code: fields.get("code").map(scalar_to_string),
            message: fields
                .get("message")
                .map_or_else(|| Value::Object(fields.clone()).to_string(), scalar_to_string),
        },
        other => RequestError::Status {
            status,
            code: None,
            message: scalar_to_string(other),
        },
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    async fn send(&self, request: ApiRequest) -> Result<Value, RequestError> {
        let url = self.url_for(&request)?;
        debug!(method = %request.method, url = %url, "sending request");

        let mut http = self.client.request(request.method.into(), url);
        for (name, value) in &request.headers {
            http = http.header(name.as_str(), scalar_to_string(value));
        }
        if request.method.has_body() {
            http = http.json(&Value::Object(request.args.clone()));
        }
        if let Some(limit) = request.timeout {
            http = http.timeout(limit);
        }

        let mut response = http
            .send()
            .await
            .map_err(|err| Self::map_send_error(&request, &err))?;

        let status = response.status();
        let total = response.content_length().filter(|len| *len > 0);
        let mut body = Vec::new();
        let mut reported = 0.0_f64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| Self::map_send_error(&request, &err))?
        {
            body.extend_from_slice(&chunk);
            if let (Some(progress), Some(total)) = (&request.on_progress, total) {
                reported = (body.len() as f64 / total as f64).min(1.0);
                progress(reported);
            }
        }
        if let Some(progress) = &request.on_progress
            && reported < 1.0
        {
            progress(1.0);
        }

        self.decode(status, &body)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpConnectorFactory
// ─────────────────────────────────────────────────────────────────────────────

/// Creates [`HttpConnector`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnectorFactory;

impl ConnectorFactory for HttpConnectorFactory {
    fn create(
        &self,
        name: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Connector>, RequestError> {
        debug!(api = name, url = %options.url, "creating http connector");
        Ok(Arc::new(HttpConnector::new(options.clone())?))
    }
}

/// Collects key/value pairs into a JSON object.
#[must_use]
pub fn object<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Method;
    use serde_json::json;

    fn connector(url: &str) -> HttpConnector {
        HttpConnector::new(ConnectionOptions::new(url)).unwrap()
    }

    #[test]
    fn url_fills_placeholders_and_queries_leftovers() {
        let request = ApiRequest::new(Method::Get, "/0/users/:id")
            .with_params(object([("id", json!(42)), ("expand", json!("roles"))]))
            .with_args(object([("page", json!(2))]));

        let url = connector("http://localhost:8080/api/").url_for(&request).unwrap();
        assert_eq!(url.path(), "/api/0/users/42");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("expand".into(), "roles".into())));
        assert!(query.contains(&("page".into(), "2".into())));
    }

    #[test]
    fn body_methods_keep_args_out_of_the_query() {
        let request = ApiRequest::new(Method::Post, "/items").with_args(object([("a", json!(1))]));

        let url = connector("http://localhost").url_for(&request).unwrap();
        assert_eq!(url.path(), "/items");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn placeholder_values_are_percent_encoded() {
        let request = ApiRequest::new(Method::Get, "/files/:name")
            .with_params(object([("name", json!("a b/c"))]));

        let url = connector("http://localhost").url_for(&request).unwrap();
        assert_eq!(url.path(), "/files/a%20b%2Fc");
    }

    #[test]
    fn missing_placeholder_is_an_invalid_request() {
        let request = ApiRequest::new(Method::Get, "/users/:id");
        assert!(matches!(
            connector("http://localhost").url_for(&request),
            Err(RequestError::InvalidRequest(_))
        ));
    }

    #[test]
    fn decode_unwraps_the_data_key() {
        let connector = connector("http://localhost");
        let body = br#"{"data": {"id": 1}, "_meta": {}}"#;
        assert_eq!(
            connector.decode(StatusCode::OK, body).unwrap(),
            json!({"id": 1})
        );
    }

    #[test]
    fn decode_returns_non_envelopes_unchanged() {
        let connector = connector("http://localhost");
        assert_eq!(
            connector.decode(StatusCode::OK, br#"{"pong": true}"#).unwrap(),
            json!({"pong": true})
        );
        assert_eq!(connector.decode(StatusCode::OK, b"").unwrap(), Value::Null);
    }

    #[test]
    fn decode_honours_custom_keys_and_meta() {
        let options = ConnectionOptions::new("http://localhost")
            .with_data_key("result")
            .with_meta(true);
        let connector = HttpConnector::new(options).unwrap();

        let body = br#"{"result": 5, "_meta": {"took": 3}}"#;
        assert_eq!(
            connector.decode(StatusCode::OK, body).unwrap(),
            json!({"result": 5, "_meta": {"took": 3}})
        );
    }

    #[test]
    fn decode_maps_error_envelopes() {
        let connector = connector("http://localhost");
        let body = br#"{"error": {"message": "no such user", "code": "not_found"}}"#;

        let err = connector.decode(StatusCode::NOT_FOUND, body).unwrap_err();
        assert!(matches!(
            err,
            RequestError::Status { status: 404, code: Some(ref code), ref message }
                if code == "not_found" && message == "no such user"
        ));
    }

    #[test]
    fn decode_treats_error_in_success_body_as_failure() {
        let connector = connector("http://localhost");
        let err = connector
            .decode(StatusCode::OK, br#"{"error": "quota exceeded"}"#)
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn decode_reports_plain_text_failures() {
        let connector = connector("http://localhost");
        let err = connector
            .decode(StatusCode::SERVICE_UNAVAILABLE, b"upstream down")
            .unwrap_err();
        assert!(matches!(
            err,
            RequestError::Status { status: 503, ref message, .. } if message == "upstream down"
        ));
    }

    #[test]
    fn decode_rejects_unparseable_success_bodies() {
        let connector = connector("http://localhost");
        assert!(matches!(
            connector.decode(StatusCode::OK, b"<html>"),
            Err(RequestError::InvalidResponse(_))
        ));
    }

    #[test]
    fn invalid_api_key_header_is_rejected() {
        let options = ConnectionOptions::new("http://localhost").with_api_key("bad\nkey");
        assert!(matches!(
            HttpConnector::new(options),
            Err(RequestError::InvalidOptions(_))
        ));
    }
}
