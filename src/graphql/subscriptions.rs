//! GraphQL subscriptions for real-time updates
//!
//! Subscriptions allow clients to receive push updates over WebSocket.

use async_graphql::{Context, Subscription};
use futures::Stream;

use super::schema::PostNotifications;
use super::types::Post;

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Every post created while this subscription is open
    async fn post_created<'ctx>(&self, ctx: &Context<'ctx>) -> impl Stream<Item = Post> + 'ctx {
        ctx.data_unchecked::<PostNotifications>().subscribe()
    }
}
