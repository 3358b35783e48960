//! Shared fixture catalogue for the integration tests: a team roster mapped
//! twice (plain key column vs lazy reference) and an HR catalogue with a
//! composite natural key and a department-to-location key reference.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use seam_orm::{
    AssociationDescriptor, BackingStore, ColumnDescriptor, Entity, EntityDescriptor,
    HydrationContext, KeyComponent, KeyDescriptor, KeyType, LazyRef, LazyTarget, MappingRegistry,
    MemoryStore, OrmResult, PrimaryKey, Row, RowExt, UnitOfWork,
};

#[derive(Debug, Clone)]
pub struct Team {
    pub id: Option<i64>,
    pub name: String,
}

impl Team {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }
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
        row.insert("TEAM_ID".to_string(), opt_i64(self.id));
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

/// Member variant that maps the association as a plain key column.
#[derive(Debug, Clone)]
pub struct IdMember {
    pub id: Option<i64>,
    pub name: String,
    pub team_id: Option<i64>,
}

impl IdMember {
    pub fn new(name: &str, team_id: Option<i64>) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            team_id,
        }
    }
}

static ID_MEMBER: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("IdMember", "ID_MEMBER", KeyDescriptor::generated("MEMBER_ID"))
        .with_column(ColumnDescriptor::new("MEMBER_ID"))
        .with_column(ColumnDescriptor::new("NAME"))
        .with_column(ColumnDescriptor::new("TEAM_ID").nullable())
        .with_association(AssociationDescriptor::id_reference(
            "team",
            vec!["TEAM_ID"],
            "Team",
        ))
});

impl Entity for IdMember {
    fn descriptor() -> &'static EntityDescriptor {
        &ID_MEMBER
    }

    fn primary_key(&self) -> Option<PrimaryKey> {
        self.id.map(PrimaryKey::single)
    }

    fn set_primary_key(&mut self, key: PrimaryKey) {
        self.id = key.as_i64();
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("MEMBER_ID".to_string(), opt_i64(self.id));
        row.insert("NAME".to_string(), json!(self.name));
        row.insert("TEAM_ID".to_string(), opt_i64(self.team_id));
        row
    }

    fn from_row(row: &Row, _ctx: &HydrationContext<'_>) -> OrmResult<Self> {
        Ok(IdMember {
            id: row.get_opt("MEMBER_ID")?,
            name: row.get_typed("NAME")?,
            team_id: row.get_opt("TEAM_ID")?,
        })
    }
}

/// Member variant that maps the association as a lazy object reference.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: Option<i64>,
    pub name: String,
    pub team: Option<LazyRef<Team>>,
}

impl Member {
    pub fn new(name: &str, team: Option<LazyRef<Team>>) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            team,
        }
    }
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
        row.insert("MEMBER_ID".to_string(), opt_i64(self.id));
        row.insert("NAME".to_string(), json!(self.name));
        let team_id = self
            .team
            .as_ref()
            .and_then(|team| team.key())
            .and_then(PrimaryKey::as_i64);
        row.insert("TEAM_ID".to_string(), opt_i64(team_id));
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

#[derive(Debug, Clone)]
pub struct Location {
    pub id: Option<i64>,
    pub city: String,
}

impl Location {
    pub fn new(city: &str) -> Self {
        Self {
            id: None,
            city: city.to_string(),
        }
    }
}

static LOCATION: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("Location", "LOCATION", KeyDescriptor::generated("LOCATION_ID"))
        .with_column(ColumnDescriptor::new("LOCATION_ID"))
        .with_column(ColumnDescriptor::new("CITY"))
});

impl Entity for Location {
    fn descriptor() -> &'static EntityDescriptor {
        &LOCATION
    }

    fn primary_key(&self) -> Option<PrimaryKey> {
        self.id.map(PrimaryKey::single)
    }

    fn set_primary_key(&mut self, key: PrimaryKey) {
        self.id = key.as_i64();
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("LOCATION_ID".to_string(), opt_i64(self.id));
        row.insert("CITY".to_string(), json!(self.city));
        row
    }

    fn from_row(row: &Row, _ctx: &HydrationContext<'_>) -> OrmResult<Self> {
        Ok(Location {
            id: row.get_opt("LOCATION_ID")?,
            city: row.get_typed("CITY")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Department {
    pub id: Option<i64>,
    pub name: String,
    pub location_id: Option<i64>,
}

impl Department {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            location_id: None,
        }
    }

    pub fn in_location(name: &str, location_id: i64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            location_id: Some(location_id),
        }
    }
}

static DEPARTMENT: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("Department", "DEPARTMENT", KeyDescriptor::generated("DEPT_ID"))
        .with_column(ColumnDescriptor::new("DEPT_ID"))
        .with_column(ColumnDescriptor::new("NAME"))
        .with_column(ColumnDescriptor::new("LOCATION_ID").nullable())
        .with_association(AssociationDescriptor::id_reference(
            "location",
            vec!["LOCATION_ID"],
            "Location",
        ))
});

impl Entity for Department {
    fn descriptor() -> &'static EntityDescriptor {
        &DEPARTMENT
    }

    fn primary_key(&self) -> Option<PrimaryKey> {
        self.id.map(PrimaryKey::single)
    }

    fn set_primary_key(&mut self, key: PrimaryKey) {
        self.id = key.as_i64();
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("DEPT_ID".to_string(), opt_i64(self.id));
        row.insert("NAME".to_string(), json!(self.name));
        row.insert("LOCATION_ID".to_string(), opt_i64(self.location_id));
        row
    }

    fn from_row(row: &Row, _ctx: &HydrationContext<'_>) -> OrmResult<Self> {
        Ok(Department {
            id: row.get_opt("DEPT_ID")?,
            name: row.get_typed("NAME")?,
            location_id: row.get_opt("LOCATION_ID")?,
        })
    }
}

/// Composite natural key: employee id paired with the period start date.
#[derive(Debug, Clone)]
pub struct JobHistory {
    pub employee_id: i64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub department_id: Option<i64>,
}

static JOB_HISTORY: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new(
        "JobHistory",
        "JOB_HISTORY",
        KeyDescriptor::natural(vec![
            ("EMPLOYEE_ID", KeyType::Int),
            ("START_DATE", KeyType::Date),
        ]),
    )
    .with_column(ColumnDescriptor::new("EMPLOYEE_ID"))
    .with_column(ColumnDescriptor::new("START_DATE"))
    .with_column(ColumnDescriptor::new("END_DATE").nullable())
    .with_column(ColumnDescriptor::new("DEPT_ID").nullable())
    .with_association(AssociationDescriptor::id_reference(
        "department",
        vec!["DEPT_ID"],
        "Department",
    ))
});

impl Entity for JobHistory {
    fn descriptor() -> &'static EntityDescriptor {
        &JOB_HISTORY
    }

    fn primary_key(&self) -> Option<PrimaryKey> {
        Some(job_key(self.employee_id, self.start_date))
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("EMPLOYEE_ID".to_string(), json!(self.employee_id));
        row.insert("START_DATE".to_string(), json!(iso_date(self.start_date)));
        row.insert(
            "END_DATE".to_string(),
            self.end_date
                .map(|d| Value::from(iso_date(d)))
                .unwrap_or(Value::Null),
        );
        row.insert("DEPT_ID".to_string(), opt_i64(self.department_id));
        row
    }

    fn from_row(row: &Row, _ctx: &HydrationContext<'_>) -> OrmResult<Self> {
        Ok(JobHistory {
            employee_id: row.get_typed("EMPLOYEE_ID")?,
            start_date: row.get_typed("START_DATE")?,
            end_date: row.get_opt("END_DATE")?,
            department_id: row.get_opt("DEPT_ID")?,
        })
    }
}

pub fn job_key(employee_id: i64, start_date: NaiveDate) -> PrimaryKey {
    PrimaryKey::composite([
        ("EMPLOYEE_ID", KeyComponent::Int(employee_id)),
        ("START_DATE", KeyComponent::Date(start_date)),
    ])
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn iso_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn opt_i64(v: Option<i64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

pub fn registry() -> Arc<MappingRegistry> {
    Arc::new(
        MappingRegistry::builder()
            .entity::<Team>()
            .entity::<IdMember>()
            .entity::<Member>()
            .entity::<Location>()
            .entity::<Department>()
            .entity::<JobHistory>()
            .build()
            .unwrap(),
    )
}

pub fn store(registry: &Arc<MappingRegistry>) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(registry.as_ref()))
}

pub fn session(registry: &Arc<MappingRegistry>, store: &Arc<MemoryStore>) -> UnitOfWork {
    let store: Arc<dyn BackingStore> = store.clone();
    UnitOfWork::new(registry.clone(), store)
}
