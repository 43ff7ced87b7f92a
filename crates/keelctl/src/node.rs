//! Node subcommands for keelctl.

use crate::common::Context;

/// Remove server `id` from the cluster.
pub async fn leave(ctx: &Context, id: u64) {
    ctx.run(keelson_node::leave(id, ctx.store.clone(), None, &ctx.cancel))
        .await;
    println!("server {} removed", id);
}
