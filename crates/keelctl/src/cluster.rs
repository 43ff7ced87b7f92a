//! Cluster subcommands for keelctl.

use keelson_proto::KsError;
use tabled::{Table, Tabled};

use crate::common::Context;

#[derive(Tabled)]
struct MemberRow {
    #[tabled(rename = "Id")]
    id: u64,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Leader")]
    leader: &'static str,
}

/// Print the member list as reported by the leader.
pub async fn list(ctx: &Context) {
    let (leader, servers) = ctx
        .run(async {
            let mut client = ctx.connect().await?;
            let leader = client.leader(&ctx.cancel).await?;
            let servers = client.cluster(&ctx.cancel).await?;
            Ok::<_, KsError>((leader, servers))
        })
        .await;

    let rows: Vec<MemberRow> = servers
        .into_iter()
        .map(|s| MemberRow {
            leader: if leader.as_ref() == Some(&s) { "*" } else { "" },
            id: s.id,
            address: s.address,
        })
        .collect();
    println!("{}", Table::new(&rows));
}

/// Print the current leader.
pub async fn leader(ctx: &Context) {
    let leader = ctx
        .run(async {
            let mut client = ctx.connect().await?;
            client.leader(&ctx.cancel).await
        })
        .await;

    match leader {
        Some(info) => println!("{}", info),
        None => println!("no leader"),
    }
}
