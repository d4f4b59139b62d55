use crate::{
    BoundField, DialectProfile, Entity, Error, Expr, IdentityRetrieval, Lowerer, Order, Ordered,
    Parameter, QueryScope, Result, Value, binder, lit, param, resolve, separated_by,
    write_literal, write_pagination,
};

/// A compiled statement: dialect-correct SQL text plus bound parameters.
#[derive(Debug)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Parameter>,
    /// How the generated identity key comes back, for identity inserts.
    pub key: Option<KeySource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// First column of the first returned row.
    Scalar,
    /// Named output parameter, surfaced by the client as a result row.
    OutParam(String),
}

/// A compiled paged select: the row query and the shared-predicate COUNT(1)
/// query. `sql` is the combined artifact (two statements, or one anonymous
/// block opening two ref cursors under Oracle).
#[derive(Debug)]
pub struct PagedStatement {
    pub sql: String,
    pub row_sql: String,
    pub count_sql: String,
    pub params: Vec<Parameter>,
    /// Output ref-cursor parameter names, Oracle only.
    pub cursors: Option<[String; 2]>,
}

/// Query intent for select statements.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub projection: Option<Expr>,
    pub predicate: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<Ordered>,
    pub offset: u64,
    /// `0` means unbounded: every row after `offset`.
    pub fetch: u64,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn select(mut self, projection: Expr) -> Self {
        self.projection = Some(projection);
        self
    }
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }
    pub fn group(mut self, expression: Expr) -> Self {
        self.group_by.push(expression);
        self
    }
    pub fn having(mut self, predicate: Expr) -> Self {
        self.having = Some(predicate);
        self
    }
    pub fn order_by(mut self, ordered: Ordered) -> Self {
        self.order_by.push(ordered);
        self
    }
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
    pub fn fetch(mut self, fetch: u64) -> Self {
        self.fetch = fetch;
        self
    }
}

/// Builds full statements by driving expression lowering per clause.
///
/// Filter clauses (WHERE, GROUP BY, HAVING, ORDER BY) are lowered first
/// because lowering them is what discovers the joins; the SELECT list, FROM
/// and JOIN fragments are computed afterwards and the final text is assembled
/// by reordering the pre-computed fragments, never by re-lowering.
pub struct StatementBuilder {
    profile: &'static DialectProfile,
}

struct SelectFragments {
    select: String,
    from: String,
    where_: String,
    group_by: String,
    having: String,
    order_by: String,
    params: Vec<Parameter>,
}

impl StatementBuilder {
    pub fn new(profile: &'static DialectProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &'static DialectProfile {
        self.profile
    }

    fn lower_select<E: Entity>(&self, query: &SelectQuery) -> Result<SelectFragments> {
        let descriptor = resolve::<E>();
        let mut lowerer = Lowerer::new(self.profile, QueryScope::new());
        let root = lowerer.scope.add_root(descriptor.clone());

        let mut where_ = String::new();
        if let Some(predicate) = &query.predicate {
            lowerer.lower(predicate, &mut where_)?;
        }
        let mut group_by = String::new();
        for (i, expression) in query.group_by.iter().enumerate() {
            if i > 0 {
                group_by.push_str(", ");
            }
            lowerer.lower(expression, &mut group_by)?;
        }
        let mut having = String::new();
        if let Some(predicate) = &query.having {
            lowerer.lower(predicate, &mut having)?;
        }
        let mut order_by = String::new();
        for (i, ordered) in query.order_by.iter().enumerate() {
            if i > 0 {
                order_by.push_str(", ");
            }
            lowerer.lower(&ordered.expression, &mut order_by)?;
            if ordered.order == Order::Desc {
                order_by.push_str(" DESC");
            }
        }

        lowerer.alias_expansions = true;
        let mut select = String::new();
        match &query.projection {
            Some(projection) => lowerer.lower(projection, &mut select)?,
            None => lowerer.write_entity_columns(root, &mut select),
        }
        lowerer.alias_expansions = false;

        let mut from = String::new();
        self.profile.quote(&mut from, &descriptor.table);
        from.push(' ');
        from.push_str(lowerer.scope.alias(root));
        lowerer.scope.write_joins(self.profile, &mut from);

        Ok(SelectFragments {
            select,
            from,
            where_,
            group_by,
            having,
            order_by,
            params: lowerer.params,
        })
    }

    pub fn select<E: Entity>(&self, query: &SelectQuery) -> Result<Statement> {
        let fragments = self.lower_select::<E>(query)?;
        let mut sql = String::with_capacity(256);
        sql.push_str("SELECT ");
        sql.push_str(&fragments.select);
        sql.push_str(" FROM ");
        sql.push_str(&fragments.from);
        Self::append_clause(&mut sql, " WHERE ", &fragments.where_);
        Self::append_clause(&mut sql, " GROUP BY ", &fragments.group_by);
        Self::append_clause(&mut sql, " HAVING ", &fragments.having);
        Self::append_clause(&mut sql, " ORDER BY ", &fragments.order_by);
        write_pagination(self.profile, &mut sql, query.offset, query.fetch);
        sql.push_str(self.profile.terminator);
        self.finish(sql, fragments.params, None)
    }

    /// Single-row select: an optional projection (entity columns when absent)
    /// filtered by `predicate`.
    pub fn select_single<E: Entity>(
        &self,
        projection: Option<Expr>,
        predicate: Expr,
    ) -> Result<Statement> {
        let query = SelectQuery {
            projection,
            predicate: Some(predicate),
            ..SelectQuery::default()
        };
        self.select::<E>(&query)
    }

    pub fn select_by_id<E: Entity>(&self, projection: Option<Expr>, id: Value) -> Result<Statement> {
        let descriptor = resolve::<E>();
        let identity = Self::identity_of(&descriptor)?;
        self.select_single::<E>(projection, param("x").member(identity).eq(lit(id)))
    }

    /// Row query plus total-count query. WHERE is lowered once and shared;
    /// ORDER BY and pagination apply only to the row side.
    pub fn select_paged<E: Entity>(&self, query: &SelectQuery) -> Result<PagedStatement> {
        let fragments = self.lower_select::<E>(query)?;
        let mut params = fragments.params;

        let mut row_core = String::with_capacity(256);
        row_core.push_str("SELECT ");
        row_core.push_str(&fragments.select);
        row_core.push_str(" FROM ");
        row_core.push_str(&fragments.from);
        Self::append_clause(&mut row_core, " WHERE ", &fragments.where_);
        Self::append_clause(&mut row_core, " GROUP BY ", &fragments.group_by);
        Self::append_clause(&mut row_core, " HAVING ", &fragments.having);
        Self::append_clause(&mut row_core, " ORDER BY ", &fragments.order_by);
        write_pagination(self.profile, &mut row_core, query.offset, query.fetch);

        let mut count_core = String::with_capacity(128);
        count_core.push_str("SELECT COUNT(1) FROM ");
        count_core.push_str(&fragments.from);
        Self::append_clause(&mut count_core, " WHERE ", &fragments.where_);

        let row_sql = format!("{}{}", row_core, self.profile.terminator);
        let count_sql = format!("{}{}", count_core, self.profile.terminator);

        let (sql, cursors) = if self.profile.identity == IdentityRetrieval::ReturningInto {
            // Oracle: one anonymous block, two opened ref cursors.
            let rows_cursor = self.profile.param_name(params.len());
            params.push(Parameter::output(rows_cursor.clone(), Value::Null));
            let count_cursor = self.profile.param_name(params.len());
            params.push(Parameter::output(count_cursor.clone(), Value::Null));
            (
                format!(
                    "BEGIN OPEN {} FOR {}; OPEN {} FOR {}; END;",
                    rows_cursor, row_core, count_cursor, count_core
                ),
                Some([rows_cursor, count_cursor]),
            )
        } else {
            (format!("{}\n{}", row_sql, count_sql), None)
        };

        self.check_param_cap(&params)?;
        Ok(PagedStatement {
            sql,
            row_sql,
            count_sql,
            params,
            cursors,
        })
    }

    fn insertable_fields<E: Entity>(
        &self,
        entity: &E,
        subset: Option<&[&str]>,
    ) -> Result<Vec<BoundField>> {
        let fields: Vec<BoundField> = binder::<E>()
            .bind(entity)
            .into_iter()
            .filter(|f| !f.identity)
            .filter(|f| subset.is_none_or(|s| s.contains(&f.property)))
            .collect();
        if fields.is_empty() {
            return Err(Error::msg("No insertable fields for the entity"));
        }
        if let Some(subset) = subset
            && subset.len() != fields.len()
        {
            return Err(Error::msg(format!(
                "Insert property list {:?} names properties without a mapped, non-identity column",
                subset
            )));
        }
        Ok(fields)
    }

    fn insert_core(&self, table: &str, fields: &[BoundField]) -> (String, Vec<Parameter>) {
        let mut sql = String::with_capacity(128);
        let mut params = Vec::with_capacity(fields.len());
        sql.push_str("INSERT INTO ");
        self.profile.quote(&mut sql, table);
        sql.push_str(" (");
        separated_by(
            &mut sql,
            fields,
            |sql, field| self.profile.quote(sql, &field.column),
            ", ",
        );
        sql.push_str(") VALUES (");
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            self.profile.placeholder(&mut sql, params.len());
            params.push(Parameter::input(
                self.profile.param_name(params.len()),
                field.value.clone(),
            ));
        }
        sql.push(')');
        (sql, params)
    }

    pub fn insert<E: Entity>(&self, entity: &E) -> Result<Statement> {
        self.insert_with::<E>(entity, None)
    }

    pub fn insert_with<E: Entity>(&self, entity: &E, subset: Option<&[&str]>) -> Result<Statement> {
        let descriptor = resolve::<E>();
        let fields = self.insertable_fields(entity, subset)?;
        let (mut sql, params) = self.insert_core(&descriptor.table, &fields);
        sql.push_str(self.profile.terminator);
        self.finish(sql, params, None)
    }

    /// Insert returning the generated identity key, by whichever strategy the
    /// dialect supports.
    pub fn insert_identity<E: Entity>(&self, entity: &E) -> Result<Statement> {
        let descriptor = resolve::<E>();
        let identity = descriptor.identity().ok_or_else(|| {
            Error::msg(format!(
                "Cannot return an identity from table `{}`: no identity column",
                descriptor.table
            ))
        })?;
        let fields = self.insertable_fields(entity, None)?;
        let (mut sql, mut params) = self.insert_core(&descriptor.table, &fields);
        let key = match self.profile.identity {
            IdentityRetrieval::TrailingSelect(retrieve) => {
                sql.push_str(self.profile.terminator);
                sql.push(' ');
                sql.push_str(retrieve);
                KeySource::Scalar
            }
            IdentityRetrieval::Returning => {
                sql.push_str(" RETURNING ");
                self.profile.quote(&mut sql, &identity.column);
                KeySource::Scalar
            }
            IdentityRetrieval::ReturningInto => {
                sql.push_str(" RETURNING ");
                self.profile.quote(&mut sql, &identity.column);
                sql.push_str(" INTO ");
                let name = self.profile.param_name(params.len());
                sql.push_str(&name);
                params.push(Parameter::output(name.clone(), identity.shape.clone()));
                KeySource::OutParam(name)
            }
        };
        sql.push_str(self.profile.terminator);
        self.finish(sql, params, Some(key))
    }

    /// Multi-row insert, split per dialect caps. Row values are inlined as
    /// literals, so the row cap governs the split; Oracle has no multi-row
    /// VALUES form and gets one `UNION ALL SELECT … FROM DUAL` arm per row.
    pub fn insert_batch<E: Entity>(&self, entities: &[E]) -> Result<Vec<Statement>> {
        let descriptor = resolve::<E>();
        let plan = binder::<E>();
        let columns: Vec<_> = descriptor.columns.iter().filter(|c| !c.identity).collect();
        if columns.is_empty() {
            return Err(Error::msg(format!(
                "Table `{}` has no insertable columns",
                descriptor.table
            )));
        }

        let mut head = String::with_capacity(64);
        head.push_str("INSERT INTO ");
        self.profile.quote(&mut head, &descriptor.table);
        head.push_str(" (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                head.push_str(", ");
            }
            self.profile.quote(&mut head, &column.column);
        }
        head.push(')');

        let mut statements = Vec::new();
        for chunk in entities.chunks(self.profile.max_batch_rows) {
            let mut sql = head.clone();
            sql.push_str(if self.profile.union_all_values {
                " "
            } else {
                " VALUES "
            });
            for (r, entity) in chunk.iter().enumerate() {
                let fields = plan.bind(entity);
                if r > 0 {
                    sql.push_str(if self.profile.union_all_values {
                        " UNION ALL "
                    } else {
                        ", "
                    });
                }
                if self.profile.union_all_values {
                    sql.push_str("SELECT ");
                } else {
                    sql.push('(');
                }
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    let value = fields
                        .iter()
                        .find(|f| f.property == column.property)
                        .map(|f| f.value.clone())
                        .unwrap_or(Value::Null);
                    write_literal(&mut sql, &value);
                }
                if self.profile.union_all_values {
                    sql.push_str(" FROM DUAL");
                } else {
                    sql.push(')');
                }
            }
            sql.push_str(self.profile.terminator);
            statements.push(Statement {
                sql,
                params: Vec::new(),
                key: None,
            });
        }
        Ok(statements)
    }

    /// Update every non-identity column of `entity`, keyed by its identity
    /// (equality, or `IS NULL` when the key value is NULL).
    pub fn update<E: Entity>(&self, entity: &E) -> Result<Statement> {
        let descriptor = resolve::<E>();
        let identity = descriptor.identity().ok_or_else(|| {
            Error::msg(format!(
                "Cannot update table `{}` by identity: no identity column",
                descriptor.table
            ))
        })?;
        let fields = binder::<E>().bind(entity);
        let key = fields
            .iter()
            .find(|f| f.identity)
            .map(|f| f.value.clone())
            .unwrap_or(Value::Null);

        let mut sql = String::with_capacity(128);
        let mut params = Vec::new();
        sql.push_str("UPDATE ");
        self.profile.quote(&mut sql, &descriptor.table);
        sql.push_str(" SET ");
        let mut first = true;
        for field in fields.iter().filter(|f| !f.identity) {
            if !first {
                sql.push_str(", ");
            }
            first = false;
            self.profile.quote(&mut sql, &field.column);
            sql.push_str(" = ");
            self.profile.placeholder(&mut sql, params.len());
            params.push(Parameter::input(
                self.profile.param_name(params.len()),
                field.value.clone(),
            ));
        }
        if first {
            return Err(Error::msg("No updatable fields for the entity"));
        }
        sql.push_str(" WHERE ");
        self.profile.quote(&mut sql, &identity.column);
        if key.is_null() {
            sql.push_str(" IS NULL");
        } else {
            sql.push_str(" = ");
            self.profile.placeholder(&mut sql, params.len());
            params.push(Parameter::input(self.profile.param_name(params.len()), key));
        }
        sql.push_str(self.profile.terminator);
        self.finish(sql, params, None)
    }

    /// Update chosen properties from computed expressions, filtered by an
    /// arbitrary predicate.
    pub fn update_where<E: Entity>(
        &self,
        assignments: &[(&'static str, Expr)],
        predicate: &Expr,
    ) -> Result<Statement> {
        if assignments.is_empty() {
            return Err(Error::msg("An update requires at least one assignment"));
        }
        let descriptor = resolve::<E>();
        let mut quoted = String::new();
        self.profile.quote(&mut quoted, &descriptor.table);
        let mut lowerer = Lowerer::new(self.profile, QueryScope::new());
        lowerer.scope.add_root_named(descriptor.clone(), quoted.clone());

        let mut where_ = String::new();
        lowerer.lower(predicate, &mut where_)?;
        let mut sets = String::new();
        for (i, (property, expression)) in assignments.iter().enumerate() {
            if i > 0 {
                sets.push_str(", ");
            }
            let column = descriptor.column(property).ok_or_else(|| {
                Error::msg(format!(
                    "No column mapped for property `{}` on table `{}`",
                    property, descriptor.table
                ))
            })?;
            self.profile.quote(&mut sets, &column.column);
            sets.push_str(" = ");
            lowerer.lower(expression, &mut sets)?;
        }
        Self::reject_joins(&lowerer)?;

        let mut sql = String::with_capacity(128);
        sql.push_str("UPDATE ");
        sql.push_str(&quoted);
        sql.push_str(" SET ");
        sql.push_str(&sets);
        sql.push_str(" WHERE ");
        sql.push_str(&where_);
        sql.push_str(self.profile.terminator);
        self.finish(sql, lowerer.params, None)
    }

    pub fn delete_by_id<E: Entity>(&self, id: Value) -> Result<Statement> {
        let descriptor = resolve::<E>();
        let identity = Self::identity_of(&descriptor)?;
        self.delete_where::<E>(&param("x").member(identity).eq(lit(id)))
    }

    pub fn delete_where<E: Entity>(&self, predicate: &Expr) -> Result<Statement> {
        let descriptor = resolve::<E>();
        let mut quoted = String::new();
        self.profile.quote(&mut quoted, &descriptor.table);
        let mut lowerer = Lowerer::new(self.profile, QueryScope::new());
        lowerer.scope.add_root_named(descriptor.clone(), quoted.clone());

        let mut where_ = String::new();
        lowerer.lower(predicate, &mut where_)?;
        Self::reject_joins(&lowerer)?;

        let mut sql = String::with_capacity(96);
        sql.push_str("DELETE FROM ");
        sql.push_str(&quoted);
        sql.push_str(" WHERE ");
        sql.push_str(&where_);
        sql.push_str(self.profile.terminator);
        self.finish(sql, lowerer.params, None)
    }

    fn identity_of(descriptor: &crate::EntityDescriptor) -> Result<&'static str> {
        descriptor
            .identity()
            .map(|c| c.property)
            .ok_or_else(|| {
                Error::msg(format!(
                    "Table `{}` has no identity column",
                    descriptor.table
                ))
            })
    }

    fn reject_joins(lowerer: &Lowerer) -> Result<()> {
        if lowerer.scope.len() > 1 {
            return Err(Error::msg(
                "Navigation properties cannot be referenced in UPDATE/DELETE predicates",
            ));
        }
        Ok(())
    }

    fn append_clause(sql: &mut String, keyword: &str, clause: &str) {
        if !clause.is_empty() {
            sql.push_str(keyword);
            sql.push_str(clause);
        }
    }

    fn check_param_cap(&self, params: &[Parameter]) -> Result<()> {
        if params.len() > self.profile.max_batch_params {
            return Err(Error::msg(format!(
                "Statement requires {} parameters, over the {} allowed by {:?}",
                params.len(),
                self.profile.max_batch_params,
                self.profile.dialect
            )));
        }
        Ok(())
    }

    fn finish(
        &self,
        sql: String,
        params: Vec<Parameter>,
        key: Option<KeySource>,
    ) -> Result<Statement> {
        self.check_param_cap(&params)?;
        Ok(Statement { sql, params, key })
    }
}
