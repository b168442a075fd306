//! Action creators and the store keys handlers write to.

use serde_json::Value;
use shared::{
    actions::{Action, ActionType},
    error::ActionParseError,
    protocol::StoreAction,
};

pub fn change_input(key: impl Into<String>, value: impl Into<Value>) -> StoreAction {
    StoreAction::ChangeInput {
        key: key.into(),
        value: value.into(),
    }
}

pub fn remove_field(key: impl Into<String>) -> StoreAction {
    StoreAction::RemoveField { key: key.into() }
}

pub fn log_event(name: impl Into<String>, data: Value) -> StoreAction {
    StoreAction::LogEvent {
        name: name.into(),
        data,
    }
}

/// Builds an action from its wire name, as chained actions and socket frames
/// refer to them.
pub fn run_action(name: &str, payload: Value) -> Result<Action, ActionParseError> {
    let kind: ActionType = name.parse()?;
    Ok(Action::new(kind).with_payload(payload))
}

pub mod keys {
    pub const HTTP_SUCCESS_CODE: &str = "httpSuccessCode";
    pub const LOADING: &str = "Loading";
    pub const AUTH_TOKEN: &str = "authToken";
    pub const CURRENT_USER: &str = "currentUser";

    pub const LOGIN_EPI: &str = "loginEPI";
    pub const SIGNUP_EPI: &str = "signupEPI";
    pub const UPDATE_PROFILE_EPI: &str = "updateProfileEPI";

    pub const GET_PROPERTIES_EPI: &str = "getPropertiesEPI";
    pub const GET_PROPERTIES_EPR: &str = "getPropertiesEPR";
    pub const GET_PROPERTY_EPR: &str = "getPropertyEPR";
    pub const CREATE_PROPERTY_EPI: &str = "createPropertyEPI";
    pub const CREATE_PROPERTY_EPR: &str = "createPropertyEPR";

    pub const LISTINGS_PAGER: &str = "listingsPager";
    pub const GET_LISTINGS_EPI: &str = "getListingsEPI";
    pub const GET_LISTINGS_EPR: &str = "getListingsEPR";
    pub const GET_LISTING_EPR: &str = "getListingEPR";
    pub const CREATE_LISTING_EPI: &str = "createListingEPI";
    pub const CREATE_LISTING_EPR: &str = "createListingEPR";
    pub const UPDATE_LISTING_EPI: &str = "updateListingEPI";
    pub const UPLOAD_LISTING_IMAGE_EPR: &str = "uploadListingImageEPR";
    pub const SEARCH_LISTINGS_EPI: &str = "searchListingsEPI";
    pub const SEARCH_LISTINGS_EPR: &str = "searchListingsEPR";
    pub const SEARCH_PAGER: &str = "searchPager";

    pub const GET_BOOKINGS_EPR: &str = "getBookingsEPR";
    pub const CREATE_BOOKING_EPI: &str = "createBookingEPI";
    pub const CREATE_BOOKING_EPR: &str = "createBookingEPR";

    pub const GET_REVIEWS_EPR: &str = "getReviewsEPR";
    pub const CREATE_REVIEW_EPI: &str = "createReviewEPI";

    pub const LAST_SOCKET_MESSAGE: &str = "lastSocketMessage";

    pub const LISTING_ID: &str = "listingId";
    pub const PROPERTY_ID: &str = "propertyId";
    pub const BOOKING_ID: &str = "bookingId";
}
