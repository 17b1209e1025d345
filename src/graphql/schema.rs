//! GraphQL schema definition with queries, mutations, and subscriptions
//!
//! Every resolver passes straight through to the store. There is no batching,
//! caching or pagination; relations requested by the client are loaded in the
//! same resolver (see [QueryRoot::users]).

use std::collections::HashMap;

use async_graphql::extensions::Tracing;
use async_graphql::{Context, ErrorExtensions, Object, Result, Schema};
use tracing::info;

use crate::db::{CreatePost, CreateUser, Database, UpdateUser};
use crate::services::notifications::NotificationChannel;

use super::auth::AuthExt;
use super::error::{ApiError, StoreResultExt};
use super::subscriptions::SubscriptionRoot;
use super::types::{Post, User};

/// The GraphQL schema type
pub type PostboardSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Topic that `createPost` publishes to and `postCreated` listens on
pub type PostNotifications = NotificationChannel<Post>;

/// Build the GraphQL schema with all resolvers
pub fn build_schema(db: Database, notifications: PostNotifications) -> PostboardSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(db)
        .data(notifications)
        .extension(Tracing)
        .finish()
}

fn not_found(entity: &'static str, id: i32) -> async_graphql::Error {
    ApiError::NotFound { entity, id }.extend()
}

fn subject<'a>(ctx: &'a Context<'_>) -> Option<&'a str> {
    ctx.try_claims().and_then(|claims| claims.sub.as_deref())
}

/// Attach each user's posts, keeping store order
fn attach_posts(users: Vec<User>, posts: Vec<Post>) -> Vec<User> {
    let mut by_author: HashMap<i32, Vec<Post>> = HashMap::new();
    for post in posts {
        by_author.entry(post.author_id).or_default().push(post);
    }
    users
        .into_iter()
        .map(|user| {
            let posts = by_author.remove(&user.id).unwrap_or_default();
            user.with_posts(posts)
        })
        .collect()
}

// ============================================================================
// Query Root
// ============================================================================

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// All users. Their posts are loaded up front when the selection asks for them.
    async fn users(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        let db = ctx.data_unchecked::<Database>();
        let users: Vec<User> = db
            .users()
            .list_all()
            .await
            .gql()?
            .into_iter()
            .map(User::from)
            .collect();

        if !ctx.look_ahead().field("posts").exists() {
            return Ok(users);
        }

        // Every user is returned, so every post is needed
        let posts = db.posts().list_all().await.gql()?;
        Ok(attach_posts(users, posts.into_iter().map(Post::from).collect()))
    }

    /// One user by id, or null
    async fn user(&self, ctx: &Context<'_>, id: i32) -> Result<Option<User>> {
        let db = ctx.data_unchecked::<Database>();
        let Some(user) = db.users().get_by_id(id).await.gql()? else {
            return Ok(None);
        };
        let user = User::from(user);

        if !ctx.look_ahead().field("posts").exists() {
            return Ok(Some(user));
        }

        let posts = db.posts().list_by_author(id).await.gql()?;
        Ok(Some(user.with_posts(posts.into_iter().map(Post::from).collect())))
    }

    /// All posts with their authors
    async fn posts(&self, ctx: &Context<'_>) -> Result<Vec<Post>> {
        let db = ctx.data_unchecked::<Database>();
        let posts = db.posts().list_with_authors().await.gql()?;
        Ok(posts.into_iter().map(Post::from).collect())
    }

    /// One post with its author, or null
    async fn post(&self, ctx: &Context<'_>, id: i32) -> Result<Option<Post>> {
        let db = ctx.data_unchecked::<Database>();
        let post = db.posts().get_with_author(id).await.gql()?;
        Ok(post.map(Post::from))
    }
}

// ============================================================================
// Mutation Root
// ============================================================================

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_user(&self, ctx: &Context<'_>, name: String, email: String) -> Result<User> {
        let db = ctx.data_unchecked::<Database>();
        let record = db.users().create(CreateUser { name, email }).await.gql()?;

        info!(user_id = record.id, subject = ?subject(ctx), "User created");
        Ok(record.into())
    }

    /// Change the supplied fields of a user. Omitted or null arguments are left as they are.
    async fn update_user(
        &self,
        ctx: &Context<'_>,
        id: i32,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<User> {
        let db = ctx.data_unchecked::<Database>();
        let record = db
            .users()
            .update(id, UpdateUser { name, email })
            .await
            .gql()?
            .ok_or_else(|| not_found("User", id))?;

        info!(user_id = id, subject = ?subject(ctx), "User updated");
        Ok(record.into())
    }

    /// Delete a user together with all of their posts
    async fn delete_user(&self, ctx: &Context<'_>, id: i32) -> Result<User> {
        let db = ctx.data_unchecked::<Database>();
        let record = db
            .users()
            .delete(id)
            .await
            .gql()?
            .ok_or_else(|| not_found("User", id))?;

        info!(user_id = id, subject = ?subject(ctx), "User deleted");
        Ok(record.into())
    }

    /// Create a post and notify `postCreated` subscribers
    async fn create_post(
        &self,
        ctx: &Context<'_>,
        title: String,
        content: String,
        author_id: i32,
    ) -> Result<Post> {
        let db = ctx.data_unchecked::<Database>();
        let created = db
            .posts()
            .create(CreatePost {
                title,
                content,
                author_id,
            })
            .await
            .gql()?;
        let post = Post::from(created);

        let notifications = ctx.data_unchecked::<PostNotifications>();
        let delivered = notifications.publish(post.clone());

        info!(
            post_id = post.id,
            author_id,
            subscribers = delivered,
            topic = notifications.topic(),
            subject = ?subject(ctx),
            "Post created"
        );
        Ok(post)
    }
}
