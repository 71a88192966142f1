//! Query-tree renderer
//!
//! `ClickhouseVisitor` is stateless. Each `render` call builds its own
//! `RenderContext`, which carries the mutation flag and the view scopes of
//! the selects being rendered, so concurrent renders never share state.

use std::collections::HashSet;

use super::clickhouse_dialect::ClickhouseDialect;
use super::dialect::SqlDialect;
use super::tree::{
    BinaryOp, DeleteStatement, Expr, FrameBound, FrameUnits, GroupBy, InsertSource,
    InsertStatement, JoinClause, JoinConstraint, JoinKind, OrderBy, Relation, SelectStatement,
    SettingValue, Settings, Statement, TableRef, UpdateStatement, WindowRef, WindowSpec,
};
use crate::error::AdapterError;

/// Renders query trees into ClickHouse SQL
pub struct ClickhouseVisitor {
    dialect: &'static dyn SqlDialect,
}

impl Default for ClickhouseVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ClickhouseVisitor {
    pub fn new() -> Self {
        Self {
            dialect: &ClickhouseDialect,
        }
    }

    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.dialect
    }

    /// Render one statement
    pub fn render(&self, statement: &Statement) -> Result<String, AdapterError> {
        let mut ctx = RenderContext {
            dialect: self.dialect,
            mutation: statement.is_mutation(),
            scopes: Vec::new(),
        };
        match statement {
            Statement::Select(select) => ctx.select(select),
            Statement::Insert(insert) => ctx.insert(insert),
            Statement::Update(update) => ctx.update(update),
            Statement::Delete(delete) => ctx.delete(delete),
        }
    }

    pub fn render_select(&self, select: &SelectStatement) -> Result<String, AdapterError> {
        RenderContext {
            dialect: self.dialect,
            mutation: false,
            scopes: Vec::new(),
        }
        .select(select)
    }

    /// Render a standalone expression (no view scope)
    pub fn render_expr(&self, expr: &Expr) -> Result<String, AdapterError> {
        RenderContext {
            dialect: self.dialect,
            mutation: false,
            scopes: Vec::new(),
        }
        .expr(expr)
    }
}

struct ViewScope {
    views: HashSet<String>,
    source_is_view: bool,
}

struct RenderContext<'a> {
    dialect: &'a dyn SqlDialect,
    /// Columns lose their table qualifier inside UPDATE/DELETE
    mutation: bool,
    scopes: Vec<ViewScope>,
}

impl RenderContext<'_> {
    fn ident(&self, name: &str) -> String {
        self.dialect.identifier(name)
    }

    fn table_name(&self, table: &TableRef) -> String {
        match &table.database {
            Some(db) => format!("{}.{}", self.ident(db), self.ident(&table.name)),
            None => self.ident(&table.name),
        }
    }

    fn list(&mut self, exprs: &[Expr]) -> Result<String, AdapterError> {
        let items = exprs
            .iter()
            .map(|e| self.expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items.join(", "))
    }

    fn select(&mut self, s: &SelectStatement) -> Result<String, AdapterError> {
        if let Some(lock) = &s.lock {
            return Err(AdapterError::unsupported(format!(
                "row locking ({}) is not supported by ClickHouse",
                lock
            )));
        }

        let (views, source_is_view) = s.view_scope();
        self.scopes.push(ViewScope {
            views,
            source_is_view,
        });
        let rendered = self.select_clauses(s);
        self.scopes.pop();
        rendered
    }

    fn select_clauses(&mut self, s: &SelectStatement) -> Result<String, AdapterError> {
        let mut parts = Vec::new();

        parts.push(if s.distinct { "SELECT DISTINCT" } else { "SELECT" }.to_string());
        if s.projections.is_empty() {
            parts.push("*".to_string());
        } else {
            parts.push(self.list(&s.projections)?);
        }

        if let Some(source) = &s.source {
            parts.push(format!("FROM {}", self.relation(&source.relation)?));
            if source.final_ {
                parts.push("FINAL".to_string());
            }
        }

        for join in &s.joins {
            parts.push(self.join(join)?);
        }

        if let Some(predicate) = self.conjunction(&s.predicates)? {
            parts.push(format!("WHERE {}", predicate));
        }

        if let Some(group) = &s.group {
            parts.push(self.group(group)?);
        }

        if let Some(having) = self.conjunction(&s.having)? {
            parts.push(format!("HAVING {}", having));
        }

        if !s.windows.is_empty() {
            let windows = s
                .windows
                .iter()
                .map(|w| Ok(format!("{} AS ({})", self.ident(&w.name), self.window_spec(&w.spec)?)))
                .collect::<Result<Vec<_>, AdapterError>>()?;
            parts.push(format!("WINDOW {}", windows.join(", ")));
        }

        if !s.orders.is_empty() {
            parts.push(format!("ORDER BY {}", self.orders(&s.orders)?));
        }

        // LIMIT n BY applies before the outer LIMIT
        if let Some((limit_by, columns)) = &s.limit_by {
            let columns: Vec<String> = columns.iter().map(|c| self.column_path(c)).collect();
            let offset = limit_by
                .offset
                .map(|o| format!(" OFFSET {}", o))
                .unwrap_or_default();
            parts.push(format!(
                "LIMIT {}{} BY {}",
                limit_by.limit,
                offset,
                columns.join(", ")
            ));
        }

        parts.extend(self.dialect.limit_offset(s.limit, s.offset));

        if let Some(settings) = self.settings(&s.settings) {
            parts.push(settings);
        }

        Ok(parts.join(" "))
    }

    fn column_path(&self, path: &str) -> String {
        path.split('.').map(|p| self.ident(p)).collect::<Vec<_>>().join(".")
    }

    fn conjunction(&mut self, predicates: &[Expr]) -> Result<Option<String>, AdapterError> {
        if predicates.is_empty() {
            return Ok(None);
        }
        let items = predicates
            .iter()
            .map(|p| self.operand(p, BinaryOp::And, false))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(items.join(" AND ")))
    }

    fn relation(&mut self, relation: &Relation) -> Result<String, AdapterError> {
        match relation {
            Relation::Table(table) => {
                let name = self.table_name(table);
                Ok(match &table.alias {
                    Some(alias) => format!("{} AS {}", name, self.ident(alias)),
                    None => name,
                })
            }
            Relation::Subquery { query, alias } => {
                let sql = format!("({})", self.select(query)?);
                Ok(match alias {
                    Some(alias) => format!("{} AS {}", sql, self.ident(alias)),
                    None => sql,
                })
            }
            Relation::Function { name, args, alias } => {
                let sql = format!("{}({})", name, self.list(args)?);
                Ok(match alias {
                    Some(alias) => format!("{} AS {}", sql, self.ident(alias)),
                    None => sql,
                })
            }
        }
    }

    fn join(&mut self, join: &JoinClause) -> Result<String, AdapterError> {
        match join {
            JoinClause::Table {
                kind,
                relation,
                constraint,
            } => {
                let keyword = match kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::Left => "LEFT JOIN",
                    JoinKind::Right => "RIGHT JOIN",
                    JoinKind::Full => "FULL JOIN",
                    JoinKind::Cross => "CROSS JOIN",
                };
                let target = self.relation(relation)?;
                match constraint {
                    JoinConstraint::On(on) => Ok(format!("{} {} ON {}", keyword, target, self.expr(on)?)),
                    JoinConstraint::Using(columns) => {
                        let columns: Vec<String> = columns.iter().map(|c| self.column_path(c)).collect();
                        Ok(format!("{} {} USING ({})", keyword, target, columns.join(", ")))
                    }
                    JoinConstraint::None => Ok(format!("{} {}", keyword, target)),
                }
            }
            JoinClause::Array { left, items } => {
                let keyword = if *left { "LEFT ARRAY JOIN" } else { "ARRAY JOIN" };
                Ok(format!("{} {}", keyword, self.list(items)?))
            }
        }
    }

    fn group(&mut self, group: &GroupBy) -> Result<String, AdapterError> {
        Ok(match group {
            GroupBy::Exprs(exprs) => format!("GROUP BY {}", self.list(exprs)?),
            GroupBy::GroupingSets(sets) => {
                let sets: Vec<String> = sets.iter().map(|set| format!("({})", set.join(", "))).collect();
                format!("GROUP BY GROUPING SETS ({})", sets.join(", "))
            }
            GroupBy::Rollup(exprs) => format!("GROUP BY ROLLUP({})", self.list(exprs)?),
            GroupBy::Cube(exprs) => format!("GROUP BY CUBE({})", self.list(exprs)?),
        })
    }

    fn orders(&mut self, orders: &[OrderBy]) -> Result<String, AdapterError> {
        let items = orders
            .iter()
            .map(|o| {
                let expr = self.expr(&o.expr)?;
                Ok(self.dialect.order_by_with_nulls(&expr, o.desc, o.nulls_last))
            })
            .collect::<Result<Vec<_>, AdapterError>>()?;
        Ok(items.join(", "))
    }

    fn window_spec(&mut self, spec: &WindowSpec) -> Result<String, AdapterError> {
        let mut parts = Vec::new();
        if !spec.partition_by.is_empty() {
            parts.push(format!("PARTITION BY {}", self.list(&spec.partition_by)?));
        }
        if !spec.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.orders(&spec.order_by)?));
        }
        if let Some(frame) = &spec.frame {
            let units = match frame.units {
                FrameUnits::Rows => "ROWS",
                FrameUnits::Range => "RANGE",
            };
            parts.push(match frame.end {
                Some(end) => format!(
                    "{} BETWEEN {} AND {}",
                    units,
                    frame_bound(frame.start),
                    frame_bound(end)
                ),
                None => format!("{} {}", units, frame_bound(frame.start)),
            });
        }
        Ok(parts.join(" "))
    }

    fn settings(&self, settings: &Settings) -> Option<String> {
        if settings.is_empty() {
            return None;
        }
        let pairs: Vec<String> = settings
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    SettingValue::Default => "DEFAULT".to_string(),
                    SettingValue::Value(v) => self.dialect.literal(v),
                };
                format!("{} = {}", key.render(), value)
            })
            .collect();
        Some(format!("SETTINGS {}", pairs.join(", ")))
    }

    /// Whether an expression reads a column of a view in the current scope
    fn references_view(&self, expr: &Expr) -> bool {
        let Some(scope) = self.scopes.last() else {
            return false;
        };
        match expr {
            Expr::Column(column) => match &column.table {
                Some(table) => scope.views.contains(table),
                None => scope.source_is_view,
            },
            Expr::Function { args, .. } => args.iter().any(|a| self.references_view(a)),
            Expr::Binary { left, right, .. } => {
                self.references_view(left) || self.references_view(right)
            }
            Expr::Alias { expr, .. } | Expr::Not(expr) => self.references_view(expr),
            _ => false,
        }
    }

    /// Render an operand of a binary operator, parenthesizing looser operators
    fn operand(&mut self, expr: &Expr, parent: BinaryOp, right_side: bool) -> Result<String, AdapterError> {
        let sql = self.expr(expr)?;
        let wrap = match expr {
            Expr::Binary { op, .. } => {
                op.precedence() < parent.precedence()
                    || (right_side
                        && op.precedence() == parent.precedence()
                        && matches!(parent, BinaryOp::Minus | BinaryOp::Divide | BinaryOp::Modulo))
            }
            _ => false,
        };
        Ok(if wrap { format!("({})", sql) } else { sql })
    }

    fn expr(&mut self, expr: &Expr) -> Result<String, AdapterError> {
        Ok(match expr {
            Expr::Column(column) => match (&column.table, self.mutation) {
                (Some(table), false) => format!("{}.{}", self.ident(table), self.ident(&column.name)),
                _ => self.ident(&column.name),
            },
            Expr::Star(None) => "*".to_string(),
            Expr::Star(Some(table)) => format!("{}.*", self.ident(table)),
            Expr::Literal(value) => self.dialect.literal(value),
            Expr::Raw(sql) => sql.clone(),
            Expr::Function { name, args } => format!("{}({})", name, self.list(args)?),
            Expr::Aggregate {
                name,
                args,
                distinct,
            } => {
                if name.eq_ignore_ascii_case("count")
                    && !distinct
                    && matches!(args.as_slice(), [] | [Expr::Star(_)])
                {
                    return Ok(self.dialect.count_star().to_string());
                }
                let name = if args.iter().any(|a| self.references_view(a)) {
                    self.dialect.merge_aggregate(name)
                } else {
                    name.clone()
                };
                let distinct = if *distinct { "DISTINCT " } else { "" };
                format!("{}({}{})", name, distinct, self.list(args)?)
            }
            Expr::Binary { left, op, right } => format!(
                "{} {} {}",
                self.operand(left, *op, false)?,
                op.as_str(),
                self.operand(right, *op, true)?
            ),
            Expr::Not(inner) => match inner.as_ref() {
                Expr::Column(_) | Expr::Literal(_) | Expr::Function { .. } | Expr::Aggregate { .. } => {
                    format!("NOT {}", self.expr(inner)?)
                }
                _ => format!("NOT ({})", self.expr(inner)?),
            },
            Expr::IsNull { expr, negated } => {
                let op = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {}", self.expr(expr)?, op)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    return Ok(if *negated { "1=1" } else { "1=0" }.to_string());
                }
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", self.expr(expr)?, op, self.list(list)?)
            }
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => {
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", self.expr(expr)?, op, self.select(query)?)
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let op = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                format!(
                    "{} {} {} AND {}",
                    self.expr(expr)?,
                    op,
                    self.expr(low)?,
                    self.expr(high)?
                )
            }
            Expr::Like {
                expr,
                pattern,
                case_sensitive,
                negated,
                escape,
            } => {
                let mut sql = format!(
                    "{} {} {}",
                    self.expr(expr)?,
                    self.dialect.like_operator(*case_sensitive, *negated),
                    self.expr(pattern)?
                );
                if let Some(ch) = escape {
                    sql.push_str(&format!(" ESCAPE {}", crate::types::quote_string(&ch.to_string())));
                }
                sql
            }
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                let mut sql = String::from("CASE");
                if let Some(operand) = operand {
                    sql.push_str(&format!(" {}", self.expr(operand)?));
                }
                for (when, then) in branches {
                    sql.push_str(&format!(" WHEN {} THEN {}", self.expr(when)?, self.expr(then)?));
                }
                if let Some(otherwise) = otherwise {
                    sql.push_str(&format!(" ELSE {}", self.expr(otherwise)?));
                }
                sql.push_str(" END");
                sql
            }
            Expr::Over { expr, window } => {
                let target = match window {
                    WindowRef::Named(name) => self.ident(name),
                    WindowRef::Inline(spec) => format!("({})", self.window_spec(spec)?),
                };
                format!("{} OVER {}", self.expr(expr)?, target)
            }
            Expr::Alias { expr, alias } => format!("{} AS {}", self.expr(expr)?, self.ident(alias)),
            Expr::Subquery(query) => format!("({})", self.select(query)?),
        })
    }

    fn insert(&mut self, insert: &InsertStatement) -> Result<String, AdapterError> {
        let mut parts = vec![format!("INSERT INTO {}", self.table_name(&insert.table))];
        if !insert.columns.is_empty() {
            let columns: Vec<String> = insert.columns.iter().map(|c| self.ident(c)).collect();
            parts.push(format!("({})", columns.join(", ")));
        }
        if let Some(settings) = self.settings(&insert.settings) {
            parts.push(settings);
        }
        match &insert.source {
            InsertSource::Values(rows) => {
                let rows: Vec<String> = rows
                    .iter()
                    .map(|row| {
                        let values: Vec<String> = row.iter().map(|v| self.dialect.literal(v)).collect();
                        format!("({})", values.join(", "))
                    })
                    .collect();
                parts.push(format!("VALUES {}", rows.join(", ")));
            }
            InsertSource::Select(query) => parts.push(self.select(query)?),
        }
        Ok(parts.join(" "))
    }

    /// Target table of a mutation; anything else has no ClickHouse form
    fn mutation_target(
        &self,
        kind: &str,
        relation: &Relation,
        has_orders: bool,
        has_limit: bool,
        has_joins: bool,
    ) -> Result<String, AdapterError> {
        if has_orders || has_limit {
            return Err(AdapterError::unsupported(format!(
                "{} with ORDER BY or LIMIT has no ClickHouse mutation form",
                kind
            )));
        }
        if has_joins {
            return Err(AdapterError::unsupported(format!(
                "{} with joins has no ClickHouse mutation form",
                kind
            )));
        }
        match relation {
            Relation::Table(table) => Ok(self.table_name(table)),
            _ => Err(AdapterError::unsupported(format!(
                "{} target must be a named table",
                kind
            ))),
        }
    }

    fn update(&mut self, update: &UpdateStatement) -> Result<String, AdapterError> {
        let table = self.mutation_target(
            "UPDATE",
            &update.relation,
            !update.orders.is_empty(),
            update.limit.is_some(),
            !update.joins.is_empty(),
        )?;
        if update.assignments.is_empty() {
            return Err(AdapterError::invalid("UPDATE requires at least one assignment"));
        }
        let assignments = update
            .assignments
            .iter()
            .map(|(column, value)| Ok(format!("{} = {}", self.ident(column), self.expr(value)?)))
            .collect::<Result<Vec<_>, AdapterError>>()?;
        let predicate = self
            .conjunction(&update.predicates)?
            .unwrap_or_else(|| "1=1".to_string());

        let mut sql = format!(
            "ALTER TABLE {} UPDATE {} WHERE {}",
            table,
            assignments.join(", "),
            predicate
        );
        if let Some(settings) = self.settings(&update.settings) {
            sql.push(' ');
            sql.push_str(&settings);
        }
        Ok(sql)
    }

    fn delete(&mut self, delete: &DeleteStatement) -> Result<String, AdapterError> {
        let table = self.mutation_target(
            "DELETE",
            &delete.relation,
            !delete.orders.is_empty(),
            delete.limit.is_some(),
            !delete.joins.is_empty(),
        )?;
        let predicate = self
            .conjunction(&delete.predicates)?
            .unwrap_or_else(|| "1=1".to_string());

        let mut sql = format!("DELETE FROM {} WHERE {}", table, predicate);
        if let Some(settings) = self.settings(&delete.settings) {
            sql.push(' ');
            sql.push_str(&settings);
        }
        Ok(sql)
    }
}

fn frame_bound(bound: FrameBound) -> String {
    match bound {
        FrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING".to_string(),
        FrameBound::Preceding(n) => format!("{} PRECEDING", n),
        FrameBound::CurrentRow => "CURRENT ROW".to_string(),
        FrameBound::Following(n) => format!("{} FOLLOWING", n),
        FrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING".to_string(),
    }
}
