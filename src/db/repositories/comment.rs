use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::entities::{comments, prelude::*};

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i32,
    pub post_id: i32,
    pub user_id: i32,
    pub content: String,
    pub parent_comment_id: Option<i32>,
    pub is_edited: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<comments::Model> for Comment {
    fn from(model: comments::Model) -> Self {
        Self {
            id: model.id,
            post_id: model.post_id,
            user_id: model.user_id,
            content: model.content,
            parent_comment_id: model.parent_comment_id,
            is_edited: model.is_edited,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct CommentRepository {
    conn: DatabaseConnection,
}

impl CommentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        post_id: i32,
        user_id: i32,
        content: &str,
        parent_comment_id: Option<i32>,
    ) -> Result<Comment> {
        let now = Utc::now().to_rfc3339();
        let active_model = comments::ActiveModel {
            post_id: Set(post_id),
            user_id: Set(user_id),
            content: Set(content.to_string()),
            parent_comment_id: Set(parent_comment_id),
            is_edited: Set(false),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active_model
            .insert(&self.conn)
            .await
            .context("Failed to insert comment")?;

        Ok(Comment::from(model))
    }

    /// Lookup scoped to the post so `/posts/{a}/comments/{b}` cannot reach
    /// a comment belonging to another post.
    pub async fn get(&self, post_id: i32, id: i32) -> Result<Option<Comment>> {
        let model = Comments::find_by_id(id)
            .filter(comments::Column::PostId.eq(post_id))
            .one(&self.conn)
            .await
            .context("Failed to query comment")?;
        Ok(model.map(Comment::from))
    }

    pub async fn list_for_post(
        &self,
        post_id: i32,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Comment>, u64)> {
        let total = Comments::find()
            .filter(comments::Column::PostId.eq(post_id))
            .count(&self.conn)
            .await?;

        let rows = Comments::find()
            .filter(comments::Column::PostId.eq(post_id))
            .order_by_asc(comments::Column::CreatedAt)
            .order_by_asc(comments::Column::Id)
            .offset(super::page_offset(page, limit))
            .limit(limit)
            .all(&self.conn)
            .await?;

        Ok((rows.into_iter().map(Comment::from).collect(), total))
    }

    pub async fn update(&self, post_id: i32, id: i32, content: &str) -> Result<Option<Comment>> {
        let Some(model) = Comments::find_by_id(id)
            .filter(comments::Column::PostId.eq(post_id))
            .one(&self.conn)
            .await?
        else {
            return Ok(None);
        };

        let mut active: comments::ActiveModel = model.into();
        active.content = Set(content.to_string());
        active.is_edited = Set(true);
        active.updated_at = Set(Utc::now().to_rfc3339());

        let model = active.update(&self.conn).await?;
        Ok(Some(Comment::from(model)))
    }

    pub async fn delete(&self, post_id: i32, id: i32) -> Result<bool> {
        let Some(model) = Comments::find_by_id(id)
            .filter(comments::Column::PostId.eq(post_id))
            .one(&self.conn)
            .await?
        else {
            return Ok(false);
        };

        comments::Entity::delete_by_id(model.id)
            .exec(&self.conn)
            .await?;
        Ok(true)
    }
}
