use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::product;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 50, message = "SKU is required"))]
    pub sku: String,
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 20, message = "Unit is required"))]
    pub unit: String,
    #[validate(length(max = 100))]
    pub barcode: Option<String>,
    #[validate(range(min = 0))]
    pub reorder_point: i32,
    #[validate(range(min = 0))]
    pub safety_stock: i32,
}

/// Field-by-field update of a product's mutable attributes. The SKU is the
/// immutable identity and is not editable. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
    #[validate(length(max = 100))]
    pub barcode: Option<String>,
    #[validate(range(min = 0))]
    pub reorder_point: Option<i32>,
    #[validate(range(min = 0))]
    pub safety_stock: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DbPool>,
}

impl ProductService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create(&self, request: CreateProductRequest) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db;

        let sku_taken = product::Entity::find()
            .filter(product::Column::Sku.eq(request.sku.clone()))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .is_some();
        if sku_taken {
            return Err(ServiceError::Conflict(format!(
                "Product with SKU {} already exists",
                request.sku
            )));
        }
        if let Some(barcode) = &request.barcode {
            self.ensure_barcode_free(barcode, None).await?;
        }

        let now = Utc::now();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(request.sku.clone()),
            name: Set(request.name),
            category: Set(request.category),
            unit: Set(request.unit),
            barcode: Set(request.barcode),
            reorder_point: Set(request.reorder_point),
            safety_stock: Set(request.safety_stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

        info!(product_id = %created.id, sku = %created.sku, "Product created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db;

        let existing = self.get(product_id).await?;
        if let Some(barcode) = &request.barcode {
            self.ensure_barcode_free(barcode, Some(product_id)).await?;
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(category) = request.category {
            active.category = Set(Some(category));
        }
        if let Some(unit) = request.unit {
            active.unit = Set(unit);
        }
        if let Some(barcode) = request.barcode {
            active.barcode = Set(Some(barcode));
        }
        if let Some(reorder_point) = request.reorder_point {
            active.reorder_point = Set(reorder_point);
        }
        if let Some(safety_stock) = request.safety_stock {
            active.safety_stock = Set(safety_stock);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await.map_err(ServiceError::DatabaseError)?;
        info!(product_id = %updated.id, sku = %updated.sku, "Product updated");
        Ok(updated)
    }

    pub async fn get(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = product::Entity::find()
            .order_by_asc(product::Column::Sku)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let products = paginator
            .fetch_page(page.max(1) - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;
        Ok((products, total))
    }

    async fn ensure_barcode_free(
        &self,
        barcode: &str,
        exclude: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query =
            product::Entity::find().filter(product::Column::Barcode.eq(barcode.to_string()));
        if let Some(product_id) = exclude {
            query = query.filter(product::Column::Id.ne(product_id));
        }
        let taken = query
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .is_some();
        if taken {
            return Err(ServiceError::Conflict(format!(
                "Barcode {} is already assigned",
                barcode
            )));
        }
        Ok(())
    }
}
