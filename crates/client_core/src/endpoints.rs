//! Backend route catalog. Each constant fixes method, body encoding, and path
//! template; `RestClient::call` fills in the rest from an `EndpointInput`.

use std::time::Duration;

use reqwest::Method;
use serde_json::{Map, Value};

use crate::transport::{ContentType, FilePart, RestClient, RestError, RestRequest, RestResponse};

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: &'static str,
    pub method: Method,
    pub content_type: ContentType,
    pub path: &'static str,
}

macro_rules! endpoint {
    ($const_name:ident, $name:literal, $method:ident, $content:ident, $path:literal) => {
        pub const $const_name: Endpoint = Endpoint {
            name: $name,
            method: Method::$method,
            content_type: ContentType::$content,
            path: $path,
        };
    };
}

endpoint!(LOGIN, "login", POST, Json, "/auth/login");
endpoint!(LOGOUT, "logout", POST, None, "/auth/logout");
endpoint!(SIGNUP, "signup", POST, Json, "/auth/signup");
endpoint!(CURRENT_USER, "current_user", GET, None, "/users/me");
endpoint!(UPDATE_PROFILE, "update_profile", PUT, Json, "/users/me");

endpoint!(LIST_PROPERTIES, "list_properties", GET, None, "/properties");
endpoint!(GET_PROPERTY, "get_property", GET, None, "/properties/{propertyId}");
endpoint!(CREATE_PROPERTY, "create_property", POST, Json, "/properties");

endpoint!(LIST_LISTINGS, "list_listings", GET, None, "/listings");
endpoint!(
    LIST_LISTINGS_PAGE,
    "list_listings_page",
    GET,
    None,
    "/listings/pages/{pageToken}"
);
endpoint!(GET_LISTING, "get_listing", GET, None, "/listings/{listingId}");
endpoint!(CREATE_LISTING, "create_listing", POST, Json, "/listings");
endpoint!(UPDATE_LISTING, "update_listing", PUT, Json, "/listings/{listingId}");
endpoint!(DELETE_LISTING, "delete_listing", DELETE, None, "/listings/{listingId}");
endpoint!(
    UPLOAD_LISTING_IMAGE,
    "upload_listing_image",
    POST,
    Multipart,
    "/listings/{listingId}/images"
);
endpoint!(SEARCH_LISTINGS, "search_listings", GET, None, "/search");
endpoint!(
    SEARCH_LISTINGS_PAGE,
    "search_listings_page",
    GET,
    None,
    "/search/pages/{pageToken}"
);

endpoint!(LIST_BOOKINGS, "list_bookings", GET, None, "/bookings");
endpoint!(CREATE_BOOKING, "create_booking", POST, Json, "/bookings");
endpoint!(
    CANCEL_BOOKING,
    "cancel_booking",
    POST,
    None,
    "/bookings/{bookingId}/cancel"
);
endpoint!(
    DOWNLOAD_INVOICE,
    "download_invoice",
    GET,
    None,
    "/bookings/{bookingId}/invoice"
);

endpoint!(LIST_REVIEWS, "list_reviews", GET, None, "/listings/{listingId}/reviews");
endpoint!(
    CREATE_REVIEW,
    "create_review",
    POST,
    Json,
    "/listings/{listingId}/reviews"
);

#[derive(Debug, Clone, Default)]
pub struct EndpointInput {
    pub path_params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
    pub files: Vec<FilePart>,
    pub bearer_token: Option<String>,
    pub timeout: Option<Duration>,
}

impl EndpointInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path_params.insert(key.into(), value.into());
        self
    }

    /// Uses every field of a JSON object as a query parameter; other values
    /// are ignored.
    pub fn query_object(mut self, value: &Value) -> Self {
        if let Value::Object(fields) = value {
            self.query
                .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn file(mut self, file: FilePart) -> Self {
        self.files.push(file);
        self
    }
}

impl Endpoint {
    pub fn request(&self, input: EndpointInput) -> RestRequest {
        RestRequest {
            method: self.method.clone(),
            path: self.path.to_string(),
            content_type: self.content_type,
            path_params: input.path_params,
            query: input.query,
            body: input.body,
            files: input.files,
            bearer_token: input.bearer_token,
            timeout: input.timeout,
        }
    }
}

impl RestClient {
    pub async fn call(
        &self,
        endpoint: &Endpoint,
        input: EndpointInput,
    ) -> Result<RestResponse, RestError> {
        self.execute(endpoint.request(input)).await
    }
}
