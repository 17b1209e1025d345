//! GraphQL object types
//!
//! Relations are eager when the parent resolver already loaded them (the
//! `preloaded_*` fields) and fall back to a store lookup otherwise, so nested
//! selections like `post { author { posts { title } } }` always resolve.

use async_graphql::{ComplexObject, Context, ErrorExtensions, Result, SimpleObject};

use crate::db::{Database, PostRecord, PostWithAuthor, UserRecord};

use super::error::{ApiError, StoreResultExt};

#[derive(SimpleObject, Clone, Debug, PartialEq)]
#[graphql(complex)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
    #[graphql(skip)]
    pub preloaded_posts: Option<Vec<Post>>,
}

#[ComplexObject]
impl User {
    /// Posts written by this user
    async fn posts(&self, ctx: &Context<'_>) -> Result<Vec<Post>> {
        if let Some(posts) = &self.preloaded_posts {
            return Ok(posts.clone());
        }
        let db = ctx.data_unchecked::<Database>();
        let records = db.posts().list_by_author(self.id).await.gql()?;
        Ok(records.into_iter().map(Post::from).collect())
    }
}

impl User {
    pub fn with_posts(mut self, posts: Vec<Post>) -> Self {
        self.preloaded_posts = Some(posts);
        self
    }
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            email: r.email,
            created_at: r.created_at,
            updated_at: r.updated_at,
            preloaded_posts: None,
        }
    }
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
#[graphql(complex)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub author_id: i32,
    pub created_at: String,
    pub updated_at: String,
    #[graphql(skip)]
    pub preloaded_author: Option<Box<User>>,
}

#[ComplexObject]
impl Post {
    /// The user who wrote this post
    async fn author(&self, ctx: &Context<'_>) -> Result<User> {
        if let Some(author) = &self.preloaded_author {
            return Ok(author.as_ref().clone());
        }
        let db = ctx.data_unchecked::<Database>();
        db.users()
            .get_by_id(self.author_id)
            .await
            .gql()?
            .map(User::from)
            .ok_or_else(|| {
                ApiError::NotFound {
                    entity: "User",
                    id: self.author_id,
                }
                .extend()
            })
    }
}

impl From<PostRecord> for Post {
    fn from(r: PostRecord) -> Self {
        Self {
            id: r.id,
            title: r.title,
            content: r.content,
            author_id: r.author_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            preloaded_author: None,
        }
    }
}

impl From<PostWithAuthor> for Post {
    fn from(r: PostWithAuthor) -> Self {
        Self {
            preloaded_author: Some(Box::new(r.author.into())),
            ..Post::from(r.post)
        }
    }
}
