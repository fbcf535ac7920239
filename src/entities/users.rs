use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub email: String,

    /// One of: user, admin, editor, moderator
    pub role: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub verified: bool,

    /// Hex-encoded HMAC of the pending email verification code
    pub verification_code: Option<String>,

    pub verification_code_sent_at: Option<String>,

    /// Hex-encoded HMAC of the pending password reset code
    pub reset_code: Option<String>,

    pub reset_code_sent_at: Option<String>,

    /// Tokens issued before this instant are rejected by the auth middleware.
    pub password_changed_at: Option<String>,

    /// Soft-delete flag. Inactive users are invisible to all lookups.
    pub active: bool,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::posts::Entity")]
    Posts,
    #[sea_orm(has_many = "super::comments::Entity")]
    Comments,
}

impl Related<super::posts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl Related<super::comments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
