//! Action vocabulary dispatched by the view layer and consumed by the saga loops.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ActionParseError;

macro_rules! action_types {
    ($($variant:ident => $wire:literal),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ActionType {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl ActionType {
            pub const ALL: &'static [ActionType] = &[$(ActionType::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(ActionType::$variant => $wire,)+
                }
            }
        }

        impl FromStr for ActionType {
            type Err = ActionParseError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($wire => Ok(ActionType::$variant),)+
                    other => Err(ActionParseError::UnknownActionType(other.to_string())),
                }
            }
        }
    };
}

action_types! {
    Login => "LOGIN",
    Signup => "SIGNUP",
    Logout => "LOGOUT",
    GetCurrentUser => "GETCURRENTUSER",
    UpdateProfile => "UPDATEPROFILE",
    GetProperties => "GETPROPERTIES",
    GetProperty => "GETPROPERTY",
    CreateProperty => "CREATEPROPERTY",
    GetListings => "GETLISTINGS",
    GetListing => "GETLISTING",
    CreateListing => "CREATELISTING",
    UpdateListing => "UPDATELISTING",
    DeleteListing => "DELETELISTING",
    UploadListingImage => "UPLOADLISTINGIMAGE",
    SearchListings => "SEARCHLISTINGS",
    GetBookings => "GETBOOKINGS",
    CreateBooking => "CREATEBOOKING",
    CancelBooking => "CANCELBOOKING",
    DownloadInvoice => "DOWNLOADINVOICE",
    GetReviews => "GETREVIEWS",
    CreateReview => "CREATEREVIEW",
    SocketMessage => "SOCKETMESSAGE",
}

impl ActionType {
    /// Actions that read or write local files. They only run when the user
    /// triggers them, never from a server-pushed frame.
    pub fn touches_local_files(self) -> bool {
        matches!(
            self,
            ActionType::UploadListingImage | ActionType::DownloadInvoice
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dispatched action.
///
/// `payload` carries the endpoint input, `params` the route and query
/// parameters that are merged into the handler's view of the store for the
/// duration of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, with = "timeout_millis", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Action {
    pub fn new(kind: ActionType) -> Self {
        Self {
            kind,
            payload: Value::Null,
            params: Map::new(),
            timeout: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

mod timeout_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(timeout) => serializer.serialize_u64(timeout.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
