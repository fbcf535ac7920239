use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set,
};

use crate::entities::{posts, prelude::*};

#[derive(Debug, Clone)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: String,
    pub user_id: i32,
    pub views: i32,
    pub comment_count: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<posts::Model> for Post {
    fn from(model: posts::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            content: model.content,
            author: model.author,
            category: model.category,
            user_id: model.user_id,
            views: model.views,
            comment_count: model.comment_count,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct NewPost<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub author: &'a str,
    pub category: &'a str,
    pub user_id: i32,
}

pub struct PostRepository {
    conn: DatabaseConnection,
}

impl PostRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, new: NewPost<'_>) -> Result<Post> {
        let now = Utc::now().to_rfc3339();
        let active_model = posts::ActiveModel {
            title: Set(new.title.to_string()),
            content: Set(new.content.to_string()),
            author: Set(new.author.to_string()),
            category: Set(new.category.to_string()),
            user_id: Set(new.user_id),
            views: Set(0),
            comment_count: Set(0),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active_model
            .insert(&self.conn)
            .await
            .context("Failed to insert post")?;

        Ok(Post::from(model))
    }

    pub async fn get(&self, id: i32) -> Result<Option<Post>> {
        let model = Posts::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query post")?;
        Ok(model.map(Post::from))
    }

    /// Fetch a post and record the view. The counter drifting under
    /// concurrent reads is acceptable here.
    pub async fn get_and_record_view(&self, id: i32) -> Result<Option<Post>> {
        let Some(model) = Posts::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let views = model.views + 1;
        let mut active: posts::ActiveModel = model.into();
        active.views = Set(views);
        let model = active.update(&self.conn).await?;

        Ok(Some(Post::from(model)))
    }

    /// Newest first, with the total row count for pagination metadata.
    pub async fn list(&self, page: u64, limit: u64) -> Result<(Vec<Post>, u64)> {
        let total = Posts::find().count(&self.conn).await?;

        let rows = Posts::find()
            .order_by_desc(posts::Column::CreatedAt)
            .order_by_desc(posts::Column::Id)
            .offset(super::page_offset(page, limit))
            .limit(limit)
            .all(&self.conn)
            .await?;

        Ok((rows.into_iter().map(Post::from).collect(), total))
    }

    pub async fn update(
        &self,
        id: i32,
        title: &str,
        content: &str,
        category: &str,
    ) -> Result<Option<Post>> {
        let Some(model) = Posts::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: posts::ActiveModel = model.into();
        active.title = Set(title.to_string());
        active.content = Set(content.to_string());
        active.category = Set(category.to_string());
        active.updated_at = Set(Utc::now().to_rfc3339());

        let model = active.update(&self.conn).await?;
        Ok(Some(Post::from(model)))
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = Posts::delete_by_id(id).exec(&self.conn).await?;
        Ok(result.rows_affected > 0)
    }

    /// Adjusts the denormalized comment counter; clamped at zero.
    pub async fn adjust_comment_count(&self, id: i32, delta: i32) -> Result<()> {
        let Some(model) = Posts::find_by_id(id).one(&self.conn).await? else {
            return Ok(());
        };

        let count = (model.comment_count + delta).max(0);
        let mut active: posts::ActiveModel = model.into();
        active.comment_count = Set(count);
        active.update(&self.conn).await?;

        Ok(())
    }
}
