use std::marker::PhantomData;

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::IntoCondition;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    IdenStatic, IntoActiveModel, Iterable, Order, PaginatorTrait, PrimaryKeyTrait, QueryFilter,
    QueryOrder, Select, Value,
};
use uuid::Uuid;

use crate::DbResult;

pub const MAX_PAGE_SIZE: u64 = 200;

const IS_DELETED: &str = "is_deleted";
const DELETED_AT: &str = "deleted_at";
const DELETED_BY: &str = "deleted_by";
const CREATED_AT: &str = "created_at";
const CREATED_BY: &str = "created_by";
const UPDATED_AT: &str = "updated_at";
const UPDATED_BY: &str = "updated_by";

/// One page of a paged query. `page` is 1-based.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<M> {
    pub items: Vec<M>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

impl<M> Page<M> {
    pub fn map<N>(self, f: impl FnMut(M) -> N) -> Page<N> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Generic data access for one entity over any connection (pool or
/// transaction).
///
/// Entities with an `is_deleted` column are soft-deletable: default queries
/// hide deleted rows and [`Repository::delete`] flags instead of removing.
/// Audit columns (`created_*`, `updated_*`, `deleted_*`) are stamped when
/// present.
pub struct Repository<'c, E, C> {
    conn: &'c C,
    _entity: PhantomData<fn() -> E>,
}

impl<'c, E, C> Repository<'c, E, C>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    pub fn new(conn: &'c C) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    pub fn connection(&self) -> &'c C {
        self.conn
    }

    pub fn is_soft_deletable() -> bool {
        column::<E>(IS_DELETED).is_some()
    }

    /// Base query with soft-deleted rows filtered out.
    pub fn query(&self) -> Select<E> {
        without_deleted(E::find())
    }

    /// Base query including soft-deleted rows.
    pub fn query_with_deleted(&self) -> Select<E> {
        E::find()
    }

    pub async fn get_by_id<K>(&self, id: K) -> DbResult<Option<E::Model>>
    where
        K: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        Ok(without_deleted(E::find_by_id(id)).one(self.conn).await?)
    }

    pub async fn get_by_id_with_deleted<K>(&self, id: K) -> DbResult<Option<E::Model>>
    where
        K: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        Ok(E::find_by_id(id).one(self.conn).await?)
    }

    pub async fn find<F>(&self, filter: F) -> DbResult<Vec<E::Model>>
    where
        F: IntoCondition,
    {
        Ok(self.query().filter(filter).all(self.conn).await?)
    }

    pub async fn first<F>(&self, filter: F) -> DbResult<Option<E::Model>>
    where
        F: IntoCondition,
    {
        Ok(self.query().filter(filter).one(self.conn).await?)
    }

    pub async fn any<F>(&self, filter: F) -> DbResult<bool>
    where
        F: IntoCondition,
    {
        Ok(self.first(filter).await?.is_some())
    }

    pub async fn count(&self, filter: Option<Condition>) -> DbResult<u64>
    where
        E::Model: Sync,
    {
        let query = match filter {
            Some(filter) => self.query().filter(filter),
            None => self.query(),
        };
        Ok(query.count(self.conn).await?)
    }

    /// `page` is 1-based; `page_size` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn get_paged(
        &self,
        page: u64,
        page_size: u64,
        filter: Option<Condition>,
        order: Option<(E::Column, Order)>,
    ) -> DbResult<Page<E::Model>>
    where
        E::Model: Sync,
    {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let mut query = self.query();
        if let Some(filter) = filter {
            query = query.filter(filter);
        }
        if let Some((column, direction)) = order {
            query = query.order_by(column, direction);
        }
        let paginator = query.paginate(self.conn, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;
        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    pub async fn add<A>(&self, model: A, actor: Option<Uuid>) -> DbResult<E::Model>
    where
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
        E::Model: IntoActiveModel<A>,
    {
        let mut model = model;
        stamp_if_unset(&mut model, CREATED_AT, Value::from(now()));
        stamp_if_unset(&mut model, CREATED_BY, Value::from(actor));
        stamp_if_unset(&mut model, IS_DELETED, Value::from(false));
        Ok(model.insert(self.conn).await?)
    }

    pub async fn update<A>(&self, model: A, actor: Option<Uuid>) -> DbResult<E::Model>
    where
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
        E::Model: IntoActiveModel<A>,
    {
        let mut model = model;
        mark_updated(&mut model, actor);
        Ok(model.update(self.conn).await?)
    }

    /// Soft-deletes when the entity supports it, otherwise removes the row.
    pub async fn delete<A>(&self, model: E::Model, actor: Option<Uuid>) -> DbResult<()>
    where
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
        E::Model: IntoActiveModel<A>,
    {
        let mut active: A = model.into_active_model();
        match column::<E>(IS_DELETED) {
            Some(flag) => {
                active.set(flag, Value::from(true));
                stamp(&mut active, DELETED_AT, Value::from(Some(now())));
                stamp(&mut active, DELETED_BY, Value::from(actor));
                mark_updated(&mut active, actor);
                active.update(self.conn).await?;
            }
            None => {
                active.delete(self.conn).await?;
            }
        }
        Ok(())
    }

    pub async fn delete_by_id<A, K>(&self, id: K, actor: Option<Uuid>) -> DbResult<bool>
    where
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
        E::Model: IntoActiveModel<A>,
        K: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        match self.get_by_id(id).await? {
            Some(model) => {
                self.delete::<A>(model, actor).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Clears the soft-delete flag. No-op for entities without one.
    pub async fn restore<A>(&self, model: E::Model, actor: Option<Uuid>) -> DbResult<E::Model>
    where
        A: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
        E::Model: IntoActiveModel<A>,
    {
        let Some(flag) = column::<E>(IS_DELETED) else {
            return Ok(model);
        };
        let mut active: A = model.into_active_model();
        active.set(flag, Value::from(false));
        stamp(&mut active, DELETED_AT, Value::from(None::<DateTimeWithTimeZone>));
        stamp(&mut active, DELETED_BY, Value::from(None::<Uuid>));
        mark_updated(&mut active, actor);
        Ok(active.update(self.conn).await?)
    }
}

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

fn column<E: EntityTrait>(name: &str) -> Option<E::Column> {
    E::Column::iter().find(|column| column.as_str() == name)
}

fn without_deleted<E: EntityTrait>(query: Select<E>) -> Select<E> {
    match column::<E>(IS_DELETED) {
        Some(flag) => query.filter(flag.eq(false)),
        None => query,
    }
}

fn stamp<A: ActiveModelTrait>(model: &mut A, name: &str, value: Value) {
    if let Some(column) = column::<A::Entity>(name) {
        model.set(column, value);
    }
}

fn stamp_if_unset<A: ActiveModelTrait>(model: &mut A, name: &str, value: Value) {
    if let Some(column) = column::<A::Entity>(name) {
        if model.get(column).is_not_set() {
            model.set(column, value);
        }
    }
}

fn mark_updated<A: ActiveModelTrait>(model: &mut A, actor: Option<Uuid>) {
    stamp(model, UPDATED_AT, Value::from(Some(now())));
    stamp(model, UPDATED_BY, Value::from(actor));
}
