use super::*;
use crate::client::GenericClient;
use crate::expr::{MemberInit, captured, field, lit, null};
use crate::meta::{ColumnMeta, ValueGenerated};
use crate::statement::StatementKind;
use crate::transaction::TransactionScope;
use crate::value::Value;
use std::collections::BTreeSet;
use std::sync::Mutex;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

struct Category {
    id: i64,
    name: String,
}

impl Entity for Category {
    fn meta() -> BulkResult<EntityMeta> {
        Ok(EntityMeta::new("Category", "categories")?
            .column(ColumnMeta::new("id", "id")?.key())
            .column(ColumnMeta::new("name", "name")?))
    }

    fn get(&self, member: &str) -> Option<Value> {
        match member {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            _ => None,
        }
    }
}

struct Item {
    token: String,
    description: Option<String>,
    category_id: i64,
}

impl Entity for Item {
    fn meta() -> BulkResult<EntityMeta> {
        Ok(EntityMeta::new("Item", "items")?
            .column(ColumnMeta::new("id", "id")?.key().generated(ValueGenerated::OnAdd))
            .column(ColumnMeta::new("token", "token")?)
            .column(ColumnMeta::new("description", "description")?)
            .column(ColumnMeta::new("category_id", "category_id")?))
    }

    fn get(&self, member: &str) -> Option<Value> {
        match member {
            "token" => Some(self.token.as_str().into()),
            "description" => Some(self.description.clone().into()),
            "category_id" => Some(self.category_id.into()),
            _ => None,
        }
    }
}

/// Composite key, schema-qualified, mixed-case table.
struct Link;

impl Entity for Link {
    fn meta() -> BulkResult<EntityMeta> {
        EntityMeta::new("Link", "Links")?
            .schema("graph")
            .map(|meta| {
                meta.column(ColumnMeta::new("from", "from_id").unwrap().key())
                    .column(ColumnMeta::new("to", "to_id").unwrap().key())
                    .column(ColumnMeta::new("weight", "weight").unwrap())
            })
    }

    fn get(&self, _member: &str) -> Option<Value> {
        Some(Value::Int(0))
    }
}

/// Maps a member the row does not expose.
struct Broken;

impl Entity for Broken {
    fn meta() -> BulkResult<EntityMeta> {
        Ok(EntityMeta::new("Broken", "broken")?
            .column(ColumnMeta::new("id", "id")?.key())
            .column(ColumnMeta::new("ghost", "ghost")?))
    }

    fn get(&self, member: &str) -> Option<Value> {
        (member == "id").then_some(Value::Int(1))
    }
}

/// Every column is store-generated.
struct Counter;

impl Entity for Counter {
    fn meta() -> BulkResult<EntityMeta> {
        Ok(EntityMeta::new("Counter", "counters")?.column(
            ColumnMeta::new("id", "id")?
                .key()
                .generated(ValueGenerated::OnAdd),
        ))
    }

    fn get(&self, _member: &str) -> Option<Value> {
        None
    }
}

/// No primary key.
struct LogLine;

impl Entity for LogLine {
    fn meta() -> BulkResult<EntityMeta> {
        Ok(EntityMeta::new("LogLine", "log_lines")?.column(ColumnMeta::new("line", "line")?))
    }

    fn get(&self, _member: &str) -> Option<Value> {
        None
    }
}

fn categories(n: i64) -> Vec<Category> {
    (0..n)
        .map(|id| Category {
            id,
            name: format!("category-{id}"),
        })
        .collect()
}

// ─── INSERT ─────────────────────────────────────────────────────────────────

#[test]
fn insert_binds_rows_in_order() {
    let stmt = Bulk::new()
        .insert_statement(&categories(2))
        .unwrap()
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "INSERT INTO categories (id, name) VALUES ($1, $2), ($3, $4)"
    );
    assert_eq!(
        stmt.params(),
        &[
            Value::Int(0),
            Value::from("category-0"),
            Value::Int(1),
            Value::from("category-1"),
        ]
    );
    assert!(stmt.prelude().is_empty());
    assert_eq!(stmt.kind(), StatementKind::Insert);
}

#[test]
fn insert_skips_store_generated_columns() {
    let rows = [Item {
        token: "t".into(),
        description: None,
        category_id: 3,
    }];
    let stmt = Bulk::new().insert_statement(&rows).unwrap().unwrap();
    assert_eq!(
        stmt.sql(),
        "INSERT INTO items (token, description, category_id) VALUES ($1, $2, $3)"
    );
    assert_eq!(stmt.params()[1], Value::Null);
}

#[test]
fn insert_placeholders_align_with_parameters() {
    let placeholder = regex::Regex::new(r"\$(\d+)").unwrap();
    for n in [1_usize, 7, 250] {
        let rows: Vec<Item> = (0..n)
            .map(|i| Item {
                token: format!("t{i}"),
                description: Some("d".into()),
                category_id: i as i64,
            })
            .collect();
        let stmt = Bulk::new().insert_statement(&rows).unwrap().unwrap();
        let sql = stmt.sql();
        let indices: Vec<usize> = placeholder
            .captures_iter(&sql)
            .map(|c| c[1].parse().unwrap())
            .collect();
        let unique: BTreeSet<usize> = indices.iter().copied().collect();

        assert_eq!(stmt.params().len(), n * 3);
        assert_eq!(indices.len(), n * 3);
        assert_eq!(unique.len(), n * 3);
        assert_eq!(unique.first(), Some(&1));
        assert_eq!(unique.last(), Some(&(n * 3)));
        // $(j + i*C + 1) binds row i, column j
        assert_eq!(stmt.params()[(n - 1) * 3], Value::from(format!("t{}", n - 1)));
    }
}

#[test]
fn insert_of_nothing_is_a_no_op() {
    assert!(Bulk::new().insert_statement::<Category>(&[]).unwrap().is_none());
    assert!(Bulk::new().insert_statement(&[Counter]).unwrap().is_none());
}

#[test]
fn insert_over_parameter_limit_is_rejected() {
    let bulk = Bulk::new().with_config(BulkConfig::default().max_parameters(3));
    let err = bulk.insert_statement(&categories(2)).unwrap_err();
    assert!(matches!(err, BulkError::Validation(_)));
    assert!(bulk.insert_statement(&categories(1)).is_ok());
}

#[test]
fn insert_with_unexposed_member_is_metadata_error() {
    let err = Bulk::new().insert_statement(&[Broken]).unwrap_err();
    assert!(matches!(err, BulkError::Metadata(_)));
}

#[test]
fn insert_applies_converters() {
    struct Flagged;
    impl Entity for Flagged {
        fn meta() -> BulkResult<EntityMeta> {
            Ok(EntityMeta::new("Flagged", "flagged")?.column(
                ColumnMeta::new("state", "state")?
                    .key()
                    .converter(|v| Ok(Value::Text(v.to_text().unwrap_or_default()))),
            ))
        }
        fn get(&self, _member: &str) -> Option<Value> {
            Some(Value::Bool(true))
        }
    }
    let stmt = Bulk::new().insert_statement(&[Flagged]).unwrap().unwrap();
    assert_eq!(stmt.params(), &[Value::from("true")]);
}

// ─── DELETE ─────────────────────────────────────────────────────────────────

#[test]
fn delete_joins_on_primary_key() {
    let stmt = Bulk::new()
        .delete_statement::<Category>(field("id").lt(500))
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "DELETE FROM categories AS ut1 USING (SELECT c.id, c.name FROM categories AS c \
         WHERE (c.id < 500)) AS jt1 WHERE ut1.id = jt1.id"
    );
    assert!(stmt.params().is_empty());
}

#[test]
fn delete_every_row() {
    let stmt = Bulk::new()
        .delete_statement(Query::<Category>::all())
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "DELETE FROM categories AS ut1 USING (SELECT c.id, c.name FROM categories AS c) AS jt1 \
         WHERE ut1.id = jt1.id"
    );
}

#[test]
fn delete_with_composite_key_and_schema() {
    let stmt = Bulk::new()
        .delete_statement::<Link>(field("weight").gt(2))
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "DELETE FROM graph.\"Links\" AS ut1 USING (SELECT l.from_id, l.to_id, l.weight \
         FROM graph.\"Links\" AS l WHERE (l.weight > 2)) AS jt1 \
         WHERE ut1.from_id = jt1.from_id AND ut1.to_id = jt1.to_id"
    );
}

#[test]
fn delete_hoists_captured_values() {
    let stmt = Bulk::new()
        .delete_statement::<Category>(field("id").lt(captured("max_id", 500)))
        .unwrap();
    assert_eq!(stmt.prelude(), ["SET bulk.max_id = '500';"]);
    assert_eq!(
        stmt.sql(),
        "DELETE FROM categories AS ut1 USING (SELECT c.id, c.name FROM categories AS c \
         WHERE (c.id < current_setting('bulk.max_id')::int8)) AS jt1 WHERE ut1.id = jt1.id"
    );
}

#[test]
fn delete_keeps_order_and_limit() {
    let query = Query::<Category>::all()
        .filter(field("name").is_not_null())
        .order_by_asc(field("id"))
        .limit(10);
    let stmt = Bulk::new().delete_statement::<Category>(query).unwrap();
    assert!(stmt.sql().contains("WHERE (c.name IS NOT NULL) ORDER BY c.id LIMIT 10) AS jt1"));
}

/// Table named like the default join alias.
struct Shadow;

impl Entity for Shadow {
    fn meta() -> BulkResult<EntityMeta> {
        Ok(EntityMeta::new("Shadow", "jt1")?.column(ColumnMeta::new("id", "id")?.key()))
    }

    fn get(&self, _member: &str) -> Option<Value> {
        Some(Value::Int(0))
    }
}

#[test]
fn delete_target_is_aliased_apart_from_join() {
    let stmt = Bulk::new()
        .delete_statement::<Shadow>(field("id").eq(1))
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "DELETE FROM jt1 AS ut1 USING (SELECT j.id FROM jt1 AS j WHERE (j.id = 1)) AS jt1 \
         WHERE ut1.id = jt1.id"
    );
}

#[test]
fn delete_without_primary_key_is_rejected() {
    let err = Bulk::new()
        .delete_statement::<LogLine>(field("line").eq("x"))
        .unwrap_err();
    assert!(matches!(err, BulkError::Metadata(_)));
}

#[test]
fn delete_of_projected_query_is_rejected() {
    let query = Query::<Category>::all().select(field("name"));
    let err = Bulk::new().delete_statement::<Category>(query).unwrap_err();
    assert!(err.is_unsupported_expression());
}

// ─── UPDATE ─────────────────────────────────────────────────────────────────

fn category_updater() -> MemberInit {
    MemberInit::new("Category")
}

#[test]
fn update_with_row_derived_assignment() {
    let updater = category_updater().set("name", field("id").to_text().concat("-Update"));
    let stmt = Bulk::new()
        .update_statement::<Category>(field("id").ge(500), &updater.into())
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "UPDATE categories AS ut1 SET name = (CAST(ut1.id AS text) || '-Update') \
         FROM (SELECT c.id, c.name FROM categories AS c WHERE (c.id >= 500)) AS jt1 \
         WHERE ut1.id = jt1.id"
    );
    assert!(stmt.params().is_empty());
    assert_eq!(stmt.kind(), StatementKind::Update);
}

#[test]
fn update_binds_constants_and_inlines_null() {
    let updater: Expr = MemberInit::new("Item")
        .set("token", "x")
        .set("description", null())
        .set("category_id", lit(2) * 4)
        .into();
    let stmt = Bulk::new()
        .update_statement::<Item>(field("category_id").eq(3), &updater)
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "UPDATE items AS ut1 SET token = $1, description = NULL, category_id = $2 \
         FROM (SELECT i.id, i.token, i.description, i.category_id FROM items AS i \
         WHERE (i.category_id = 3)) AS jt1 WHERE ut1.id = jt1.id"
    );
    assert_eq!(stmt.params(), &[Value::from("x"), Value::Int(8)]);
}

#[test]
fn update_merges_preludes_from_filter_and_projection() {
    let updater = category_updater().set("name", field("name").concat(captured("suffix", "-x")));
    let query = Query::<Category>::all().filter(field("id").ge(captured("minId", 500)));
    let stmt = Bulk::new()
        .update_statement::<Category>(query, &updater.into())
        .unwrap();
    assert_eq!(
        stmt.prelude(),
        ["SET bulk.minid = '500';", "SET bulk.suffix = '-x';"]
    );
    assert_eq!(
        stmt.sql(),
        "UPDATE categories AS ut1 SET name = (ut1.name || current_setting('bulk.suffix')) \
         FROM (SELECT c.id, c.name FROM categories AS c \
         WHERE (c.id >= current_setting('bulk.minid')::int8)) AS jt1 WHERE ut1.id = jt1.id"
    );
}

#[test]
fn update_with_conflicting_captures_is_rejected() {
    let updater = category_updater().set("name", field("name").concat(captured("v", "a")));
    let query = Query::<Category>::all().filter(field("name").ne(captured("v", "b")));
    let err = Bulk::new()
        .update_statement::<Category>(query, &updater.into())
        .unwrap_err();
    assert!(err.is_unsupported_expression());
}

#[test]
fn update_uses_configured_aliases() {
    let bulk = Bulk::new().with_config(BulkConfig::default().update_alias("dst").join_alias("src"));
    let updater = category_updater().set("name", field("name").upper());
    let stmt = bulk
        .update_statement::<Category>(field("id").eq(1), &updater.into())
        .unwrap();
    assert_eq!(
        stmt.sql(),
        "UPDATE categories AS dst SET name = upper(dst.name) \
         FROM (SELECT c.id, c.name FROM categories AS c WHERE (c.id = 1)) AS src \
         WHERE dst.id = src.id"
    );
}

#[test]
fn update_with_invalid_config_is_rejected() {
    let bulk = Bulk::new().with_config(BulkConfig::default().join_alias("ut1"));
    let updater = category_updater().set("name", "x");
    assert!(matches!(
        bulk.update_statement::<Category>(field("id").eq(1), &updater.into()),
        Err(BulkError::Validation(_))
    ));
}

#[test]
fn update_shape_errors_come_before_sql() {
    let bulk = Bulk::new();
    let not_init = bulk
        .update_statement::<Category>(field("id").eq(1), &field("name").eq("x"))
        .unwrap_err();
    assert!(not_init.is_unsupported_expression());

    let wrong_entity: Expr = MemberInit::new("Item").set("token", "x").into();
    assert!(
        bulk.update_statement::<Category>(field("id").eq(1), &wrong_entity)
            .unwrap_err()
            .is_binding()
    );

    let projected = Query::<Category>::all().select(field("id"));
    let updater = category_updater().set("name", "x");
    assert!(
        bulk.update_statement::<Category>(projected, &updater.into())
            .unwrap_err()
            .is_unsupported_expression()
    );
}

#[test]
fn statements_are_deterministic() {
    let bulk = Bulk::new();
    let updater: Expr = category_updater()
        .set("name", field("id").to_text())
        .into();
    let a = bulk
        .update_statement::<Category>(field("id").ge(captured("n", 1)), &updater)
        .unwrap();
    let b = bulk
        .update_statement::<Category>(field("id").ge(captured("n", 1)), &updater)
        .unwrap();
    assert_eq!(a.to_string(), b.to_string());
}

// ─── Execution ──────────────────────────────────────────────────────────────

/// Records statements; cannot open transactions.
#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
}

impl Recorder {
    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl GenericClient for Recorder {
    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> BulkResult<u64> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{sql} [{}]", params.len()));
        Ok(params.len() as u64)
    }

    async fn batch_execute(&self, sql: &str) -> BulkResult<()> {
        self.log.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    async fn query(&self, _sql: &str, _params: &[&(dyn ToSql + Sync)]) -> BulkResult<Vec<Row>> {
        Ok(Vec::new())
    }
}

impl Transactional for Recorder {
    async fn begin(&mut self) -> BulkResult<TransactionScope<'_>> {
        Err(BulkError::Connection("recorder has no transactions".to_string()))
    }
}

#[tokio::test]
async fn execution_runs_prelude_then_statement() {
    let mut conn = Recorder::default();
    let updater = category_updater().set("name", captured("label", "fixed"));
    let query = Query::<Category>::all().filter(field("id").lt(captured("max_id", 3)));
    let affected = Bulk::new()
        .bulk_update::<Category, _>(&mut conn, query, &updater.into(), true)
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(
        conn.entries(),
        [
            "SET bulk.max_id = '3';".to_string(),
            "UPDATE categories AS ut1 SET name = $1 FROM (SELECT c.id, c.name FROM categories AS c \
             WHERE (c.id < current_setting('bulk.max_id')::int8)) AS jt1 WHERE ut1.id = jt1.id [1]"
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn empty_insert_never_contacts_the_store() {
    let mut conn = Recorder::default();
    let affected = conn.bulk_insert::<Category>(&[], false).await.unwrap();
    assert_eq!(affected, 0);
    assert!(conn.entries().is_empty());
}

#[tokio::test]
async fn failed_begin_runs_nothing() {
    let mut conn = Recorder::default();
    let err = conn
        .bulk_delete::<Category>(field("id").lt(500), false)
        .await
        .unwrap_err();
    assert!(err.is_execution());
    assert!(conn.entries().is_empty());
}

#[tokio::test]
async fn binding_errors_never_reach_the_store() {
    let mut conn = Recorder::default();
    let updater: Expr = MemberInit::new("Item").set("token", "x").into();
    let err = conn
        .bulk_update::<Category>(field("id").eq(1), &updater, true)
        .await
        .unwrap_err();
    assert!(err.is_binding());
    assert!(conn.entries().is_empty());
}

// ─── Custom compilers ───────────────────────────────────────────────────────

/// Answers every projection with two columns.
struct WideProjection;

impl QueryCompiler for WideProjection {
    fn compile(&self, meta: &EntityMeta, parts: &QueryParts) -> BulkResult<String> {
        match parts.projection {
            Some(_) => Ok("SELECT a.x, a.y FROM t AS a".to_string()),
            None => PgQueryCompiler::new().compile(meta, parts),
        }
    }
}

/// Declares its parameter with a `SET @p` session variable.
struct SessionVariables;

impl QueryCompiler for SessionVariables {
    fn compile(&self, _meta: &EntityMeta, parts: &QueryParts) -> BulkResult<String> {
        Ok(match parts.projection {
            Some(_) => "SET @p = 1;\nSELECT upper(c.name) FROM categories AS c WHERE c.id > @p",
            None => "SET @p = 1;\nSELECT c.id, c.name FROM categories AS c WHERE c.id > @p",
        }
        .to_string())
    }
}

#[test]
fn multi_column_projection_from_compiler_is_rejected() {
    let bulk = Bulk::with_compiler(WideProjection);
    let updater: Expr = category_updater().set("name", field("name").upper()).into();
    let err = bulk
        .update_statement::<Category>(field("id").eq(1), &updater)
        .unwrap_err();
    assert!(err.is_unsupported_expression());

    // Constant updates never compile a projection.
    let constant: Expr = category_updater().set("name", "x").into();
    assert!(bulk.update_statement::<Category>(field("id").eq(1), &constant).is_ok());
}

#[tokio::test]
async fn multi_column_projection_never_reaches_the_store() {
    let mut conn = Recorder::default();
    let updater: Expr = category_updater().set("name", field("name").upper()).into();
    let err = Bulk::with_compiler(WideProjection)
        .bulk_update::<Category, _>(&mut conn, field("id").eq(1), &updater, true)
        .await
        .unwrap_err();
    assert!(err.is_unsupported_expression());
    assert!(conn.entries().is_empty());
}

#[test]
fn compiler_session_variables_are_hoisted() {
    let bulk = Bulk::with_compiler(SessionVariables);
    let updater: Expr = category_updater().set("name", field("name").upper()).into();
    let stmt = bulk
        .update_statement::<Category>(field("id").gt(1), &updater)
        .unwrap();
    assert_eq!(stmt.prelude(), ["SET @p = 1;"]);
    assert_eq!(
        stmt.sql(),
        "UPDATE categories AS ut1 SET name = upper(ut1.name) \
         FROM (SELECT c.id, c.name FROM categories AS c WHERE c.id > @p) AS jt1 \
         WHERE ut1.id = jt1.id"
    );

    let delete = bulk.delete_statement::<Category>(field("id").gt(1)).unwrap();
    assert_eq!(delete.prelude(), ["SET @p = 1;"]);
    assert!(!delete.sql().contains("SET"));
}
