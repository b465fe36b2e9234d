//! Conventional action names shared by the gateway and REST-style services.
//!
//! The gateway maps HTTP verbs onto these; a controller that implements the
//! full set is fully reachable over REST. Services are free to expose other
//! action names for queue-only callers.

/// `GET` on a collection.
pub const GET_ALL: &str = "getAllAction";

/// `GET` on a single resource.
pub const GET_BY_ID: &str = "getByIdAction";

/// `POST` on a collection.
pub const POST: &str = "postAction";

/// `PUT` on a single resource.
pub const PUT: &str = "putAction";

/// `DELETE` on a single resource.
pub const DELETE: &str = "deleteAction";

/// The whole convention, handy for registering a controller's REST surface.
pub const REST_ACTIONS: [&str; 5] = [GET_ALL, GET_BY_ID, POST, PUT, DELETE];
