//! Route dispatch, authentication and response building.
//!
//! [`Service::handle`] maps an [`ApiRequest`] to an [`ApiResponse`] without
//! knowing anything about the HTTP library in front of it.

use std::io::Read;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::cache::{CsvLoader, DatasetCache, DatasetLoader};
use crate::config::ServiceConfig;
use crate::encode::{NdjsonStream, to_json_array};
use crate::query::{self, OutputFormat, QueryColumns, QueryParams};

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Other,
}

impl Method {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            _ => Method::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Other => "OTHER",
        }
    }
}

/// An inbound request reduced to what routing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    /// Raw query string without `?`.
    pub query: String,
    pub api_key: Option<String>,
}

impl ApiRequest {
    /// Split `url` into path and query string.
    pub fn new(method: Method, url: &str) -> Self {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        Self {
            method,
            path: path.to_string(),
            query: query.to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Response payload.
pub enum Body {
    Json(Vec<u8>),
    /// Streamed line by line.
    Ndjson(NdjsonStream),
}

pub struct ApiResponse {
    pub status: u16,
    pub body: Body,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, payload: &T) -> Self {
        match serde_json::to_vec(payload) {
            Ok(bytes) => Self {
                status,
                body: Body::Json(bytes),
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                Self::error(500, "internal error")
            }
        }
    }

    fn error(status: u16, message: &'static str) -> Self {
        Self {
            status,
            body: Body::Json(format!(r#"{{"error":"{message}"}}"#).into_bytes()),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.body {
            Body::Json(_) => OutputFormat::Json.content_type(),
            Body::Ndjson(_) => OutputFormat::Ndjson.content_type(),
        }
    }

    /// Drain the body into memory.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self.body {
            Body::Json(bytes) => Ok(bytes),
            Body::Ndjson(mut stream) => {
                let mut out = Vec::new();
                stream.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Root,
    Health,
    Version,
    Schema,
    Dados,
    Reload,
}

impl Route {
    fn find(path: &str) -> Option<Self> {
        Some(match path {
            "/" => Route::Root,
            "/health" => Route::Health,
            "/version" => Route::Version,
            "/schema" => Route::Schema,
            "/dados" => Route::Dados,
            "/reload" => Route::Reload,
            _ => return None,
        })
    }

    fn allows(self, method: Method) -> bool {
        match self {
            Route::Root => true,
            Route::Reload => method == Method::Post,
            _ => matches!(method, Method::Get | Method::Head),
        }
    }

    fn requires_auth(self) -> bool {
        matches!(self, Route::Schema | Route::Dados | Route::Reload)
    }
}

#[derive(Serialize)]
struct Status<'a> {
    status: &'static str,
    service: &'a str,
}

#[derive(Serialize)]
struct Health<'a> {
    status: &'static str,
    rows: usize,
    source: &'a str,
    strategy: Option<String>,
}

#[derive(Serialize)]
struct Version<'a> {
    version: &'a str,
}

#[derive(Serialize)]
struct SchemaColumn<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    ty: &'static str,
}

#[derive(Serialize)]
struct Schema<'a> {
    columns: Vec<SchemaColumn<'a>>,
    count: usize,
}

#[derive(Serialize)]
struct Reloaded {
    status: &'static str,
    msg: &'static str,
    rows: usize,
}

/// The dataset API.
pub struct Service<L = CsvLoader> {
    cache: DatasetCache<L>,
    api_key: String,
    delay: Duration,
    version: String,
    name: String,
    columns: QueryColumns,
}

impl Service<CsvLoader> {
    /// Build the service and its cache for the configured source.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Service::new(DatasetCache::new(config.loader()), config)
    }
}

impl<L: DatasetLoader> Service<L> {
    pub fn new(cache: DatasetCache<L>, config: &ServiceConfig) -> Self {
        Self {
            cache,
            api_key: config.api_key.clone(),
            delay: config.delay,
            version: config.app_version.clone(),
            name: config.service_name.clone(),
            columns: config.query_columns.clone(),
        }
    }

    pub fn cache(&self) -> &DatasetCache<L> {
        &self.cache
    }

    pub fn handle(&self, req: &ApiRequest) -> ApiResponse {
        let Some(route) = Route::find(&req.path) else {
            return ApiResponse::error(404, "not found");
        };
        if !route.allows(req.method) {
            return ApiResponse::error(405, "method not allowed");
        }
        if route.requires_auth() && !self.authorized(req) {
            tracing::warn!(path = %req.path, "rejected request with missing or wrong api key");
            return ApiResponse::error(401, "unauthorized");
        }

        match route {
            Route::Root => ApiResponse::json(
                200,
                &Status {
                    status: "ok",
                    service: &self.name,
                },
            ),
            Route::Health => self.health(),
            Route::Version => ApiResponse::json(
                200,
                &Version {
                    version: &self.version,
                },
            ),
            Route::Schema => {
                self.pause();
                self.schema()
            }
            Route::Dados => {
                self.pause();
                self.dados(&req.query)
            }
            Route::Reload => self.reload(),
        }
    }

    fn authorized(&self, req: &ApiRequest) -> bool {
        req.api_key.as_deref() == Some(self.api_key.as_str())
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }

    fn health(&self) -> ApiResponse {
        let dataset = self.cache.get();
        ApiResponse::json(
            200,
            &Health {
                status: "ok",
                rows: dataset.num_rows(),
                source: &dataset.source,
                strategy: dataset.strategy().map(|s| s.to_string()),
            },
        )
    }

    fn schema(&self) -> ApiResponse {
        let dataset = self.cache.get();
        let columns = dataset
            .table
            .columns()
            .iter()
            .map(|c| SchemaColumn {
                name: &c.name,
                ty: c.ty.public_name(),
            })
            .collect();
        ApiResponse::json(
            200,
            &Schema {
                columns,
                count: dataset.num_rows(),
            },
        )
    }

    fn dados(&self, query_string: &str) -> ApiResponse {
        let params = QueryParams::from_query_string(query_string);
        let dataset = self.cache.get();
        let view = query::run(&dataset.table, &params, &self.columns);
        tracing::debug!(rows = view.len(), columns = view.columns.len(), format = %params.format, "query");

        match params.format {
            OutputFormat::Json => match to_json_array(&dataset.table, &view) {
                Ok(bytes) => ApiResponse {
                    status: 200,
                    body: Body::Json(bytes),
                },
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode rows");
                    ApiResponse::error(500, "internal error")
                }
            },
            OutputFormat::Ndjson => ApiResponse {
                status: 200,
                body: Body::Ndjson(NdjsonStream::new(dataset, view)),
            },
        }
    }

    fn reload(&self) -> ApiResponse {
        let dataset = self.cache.reload();
        ApiResponse::json(
            200,
            &Reloaded {
                status: "ok",
                msg: "dataset reloaded",
                rows: dataset.num_rows(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Dataset;
    use crate::reader::TableReader;
    use serde_json::{Value as Json, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const CSV: &str = "fk_contact;date_purchase;gmv_success\n1;2024-01-05;10.5\n2;2024-02-01;3\n1;2024-02-09;7\n";

    struct Counting(AtomicUsize);

    impl DatasetLoader for Counting {
        fn load(&self) -> Dataset {
            self.0.fetch_add(1, Ordering::SeqCst);
            Dataset::from(TableReader::new().read_text(CSV))
        }
    }

    fn service(delay: Duration) -> Service<Counting> {
        let mut config = ServiceConfig::default();
        config.api_key("secret").app_version("9.9.9").delay(delay);
        Service::new(DatasetCache::new(Counting(AtomicUsize::new(0))), &config)
    }

    fn loads(s: &Service<Counting>) -> usize {
        s.cache().loader().0.load(Ordering::SeqCst)
    }

    fn get(s: &Service<Counting>, url: &str) -> (u16, Json) {
        let res = s.handle(&ApiRequest::new(Method::Get, url).with_api_key("secret"));
        let status = res.status;
        (status, serde_json::from_slice(&res.into_bytes().unwrap()).unwrap())
    }

    #[test]
    fn test_public_routes() {
        let s = service(Duration::ZERO);
        let res = s.handle(&ApiRequest::new(Method::Get, "/"));
        assert_eq!(res.status, 200);
        let body: Json = serde_json::from_slice(&res.into_bytes().unwrap()).unwrap();
        assert_eq!(body, json!({"status": "ok", "service": "csv-serve"}));

        let (_, version) = get(&s, "/version");
        assert_eq!(version, json!({"version": "9.9.9"}));
        assert_eq!(loads(&s), 0);

        let (status, health) = get(&s, "/health");
        assert_eq!(status, 200);
        assert_eq!(health["rows"], 3);
        assert_eq!(health["strategy"], "sep=auto engine=tolerant");
    }

    #[test]
    fn test_unauthorized_causes_no_load() {
        let s = service(Duration::from_secs(5));
        let start = Instant::now();
        for url in ["/dados", "/schema"] {
            assert_eq!(s.handle(&ApiRequest::new(Method::Get, url)).status, 401);
            let wrong = ApiRequest::new(Method::Get, url).with_api_key("nope");
            assert_eq!(s.handle(&wrong).status, 401);
        }
        let res = s.handle(&ApiRequest::new(Method::Post, "/reload"));
        assert_eq!(res.status, 401);
        assert_eq!(res.into_bytes().unwrap(), br#"{"error":"unauthorized"}"#);

        assert_eq!(loads(&s), 0);
        assert!(!s.cache().is_loaded());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_route_and_method() {
        let s = service(Duration::ZERO);
        assert_eq!(s.handle(&ApiRequest::new(Method::Get, "/nope")).status, 404);
        assert_eq!(s.handle(&ApiRequest::new(Method::Get, "/reload")).status, 405);
        assert_eq!(s.handle(&ApiRequest::new(Method::Post, "/dados")).status, 405);
    }

    #[test]
    fn test_schema() {
        let s = service(Duration::ZERO);
        let (status, schema) = get(&s, "/schema");
        assert_eq!(status, 200);
        assert_eq!(schema["count"], 3);
        assert_eq!(schema["columns"][0], json!({"name": "fk_contact", "type": "int"}));
        assert_eq!(schema["columns"][1]["type"], "datetime");
        assert_eq!(schema["columns"][2]["type"], "float");
    }

    #[test]
    fn test_dados_filters() {
        let s = service(Duration::ZERO);
        let (_, rows) = get(&s, "/dados?cliente=1&cols=gmv_success");
        assert_eq!(rows, json!([{"gmv_success": 10.5}, {"gmv_success": 7.0}]));

        let (_, rows) = get(&s, "/dados?data=2024-02&limit=1");
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["fk_contact"], 2);

        let (_, rows) = get(&s, "/dados?cliente=999");
        assert_eq!(rows, json!([]));
    }

    #[test]
    fn test_dados_ndjson() {
        let s = service(Duration::ZERO);
        let res = s.handle(&ApiRequest::new(Method::Get, "/dados?format=ndjson").with_api_key("secret"));
        assert_eq!(res.content_type(), "application/x-ndjson");
        let text = String::from_utf8(res.into_bytes().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_reload() {
        let s = service(Duration::ZERO);
        get(&s, "/dados");
        let res = s.handle(&ApiRequest::new(Method::Post, "/reload").with_api_key("secret"));
        assert_eq!(res.status, 200);
        let body: Json = serde_json::from_slice(&res.into_bytes().unwrap()).unwrap();
        assert_eq!(body, json!({"status": "ok", "msg": "dataset reloaded", "rows": 3}));
        assert_eq!(loads(&s), 2);
    }

    #[test]
    fn test_delay_applies_after_auth() {
        let s = service(Duration::from_millis(100));
        let start = Instant::now();
        assert_eq!(get(&s, "/dados").0, 200);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
