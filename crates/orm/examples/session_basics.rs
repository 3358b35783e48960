//! Walkthrough of the session lifecycle: mapping two entity types, persisting
//! a small object graph, and resolving a lazy reference.
//!
//! Run with: cargo run --example session_basics

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use seam_orm::{
    AssociationDescriptor, BackingStore, ColumnDescriptor, Entity, EntityDescriptor,
    HydrationContext, KeyDescriptor, LazyRef, LazyTarget, MappingRegistry, MemoryStore, OrmResult,
    PrimaryKey, Query, Row, RowExt, UnitOfWork,
};

#[derive(Debug, Clone)]
struct Team {
    id: Option<i64>,
    name: String,
}

static TEAM: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("Team", "TEAM", KeyDescriptor::generated("TEAM_ID"))
        .with_column(ColumnDescriptor::new("TEAM_ID"))
        .with_column(ColumnDescriptor::new("NAME"))
});

impl Entity for Team {
    fn descriptor() -> &'static EntityDescriptor {
        &TEAM
    }

    fn primary_key(&self) -> Option<PrimaryKey> {
        self.id.map(PrimaryKey::single)
    }

    fn set_primary_key(&mut self, key: PrimaryKey) {
        self.id = key.as_i64();
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(
            "TEAM_ID".to_string(),
            self.id.map(Value::from).unwrap_or(Value::Null),
        );
        row.insert("NAME".to_string(), json!(self.name));
        row
    }

    fn from_row(row: &Row, _ctx: &HydrationContext<'_>) -> OrmResult<Self> {
        Ok(Team {
            id: row.get_opt("TEAM_ID")?,
            name: row.get_typed("NAME")?,
        })
    }
}

#[derive(Debug, Clone)]
struct Member {
    id: Option<i64>,
    name: String,
    team: Option<LazyRef<Team>>,
}

static MEMBER: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("Member", "MEMBER", KeyDescriptor::generated("MEMBER_ID"))
        .with_column(ColumnDescriptor::new("MEMBER_ID"))
        .with_column(ColumnDescriptor::new("NAME"))
        .with_column(ColumnDescriptor::new("TEAM_ID").nullable())
        .with_association(AssociationDescriptor::lazy("team", vec!["TEAM_ID"], "Team"))
});

impl Entity for Member {
    fn descriptor() -> &'static EntityDescriptor {
        &MEMBER
    }

    fn primary_key(&self) -> Option<PrimaryKey> {
        self.id.map(PrimaryKey::single)
    }

    fn set_primary_key(&mut self, key: PrimaryKey) {
        self.id = key.as_i64();
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(
            "MEMBER_ID".to_string(),
            self.id.map(Value::from).unwrap_or(Value::Null),
        );
        row.insert("NAME".to_string(), json!(self.name));
        let team_id = self
            .team
            .as_ref()
            .and_then(|team| team.key())
            .and_then(PrimaryKey::as_i64);
        row.insert(
            "TEAM_ID".to_string(),
            team_id.map(Value::from).unwrap_or(Value::Null),
        );
        row
    }

    fn from_row(row: &Row, ctx: &HydrationContext<'_>) -> OrmResult<Self> {
        Ok(Member {
            id: row.get_opt("MEMBER_ID")?,
            name: row.get_typed("NAME")?,
            team: ctx.lazy_ref(row, "team")?,
        })
    }

    fn lazy_targets(&self) -> Vec<(&'static str, Option<LazyTarget>)> {
        vec![("team", self.team.as_ref().map(LazyRef::target))]
    }
}

#[tokio::main]
async fn main() -> OrmResult<()> {
    let registry = Arc::new(
        MappingRegistry::builder()
            .entity::<Team>()
            .entity::<Member>()
            .build()?,
    );
    let store = Arc::new(MemoryStore::new(registry.as_ref()));

    let backing: Arc<dyn BackingStore> = store.clone();

    // Session one: build and flush a small graph.
    let mut uow = UnitOfWork::new(registry.clone(), backing.clone());
    let team = uow
        .persist(Team {
            id: None,
            name: "engineering".to_string(),
        })
        .await?;
    let member = uow
        .persist(Member {
            id: None,
            name: "kim".to_string(),
            team: Some(LazyRef::to(team.as_ref())),
        })
        .await?;
    uow.flush().await?;
    println!(
        "flushed member {:?} on team {:?} ({} round trips)",
        member.id,
        team.id,
        store.round_trips()
    );

    // Session two: the reference stays unloaded until touched.
    let mut uow = UnitOfWork::new(registry, backing);
    let members = uow.query(Query::<Member>::new().where_eq("NAME", "kim")).await?;
    let member = &members[0];
    let team_ref = member.team.as_ref().ok_or_else(|| {
        seam_orm::OrmError::Query("member lost its team".to_string())
    })?;
    println!("loaded {}, team initialized: {}", member.name, team_ref.is_initialized());

    let team = team_ref.get(&mut uow).await?;
    println!(
        "resolved team '{}' ({} round trips total)",
        team.name,
        store.round_trips()
    );
    Ok(())
}
