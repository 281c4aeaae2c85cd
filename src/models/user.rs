use mongodb::bson::oid::ObjectId;

/// The authenticated caller, injected into request extensions by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: ObjectId,
}
