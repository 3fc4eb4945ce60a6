use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ledger entry for a single quantity change of a product at a warehouse.
///
/// Rows are append-only: nothing in this crate updates or deletes them, and
/// corrections are made with new offsetting movements. The auto-increment
/// primary key makes primary-key order the commit order of the ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub direction: MovementDirection,
    pub quantity: i32,
    pub movement_type: MovementType,
    pub ref_document_no: Option<String>,
    pub ref_line_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::warehouse::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementDirection {
    #[sea_orm(string_value = "IN")]
    In,
    #[sea_orm(string_value = "OUT")]
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    #[sea_orm(string_value = "PURCHASE")]
    Purchase,
    #[sea_orm(string_value = "SALES")]
    Sales,
    #[sea_orm(string_value = "TRANSFER")]
    Transfer,
    #[sea_orm(string_value = "ADJUSTMENT")]
    Adjustment,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ActiveEnum;

    #[test]
    fn movement_enums_have_one_canonical_encoding() {
        assert_eq!(MovementDirection::In.to_value(), "IN");
        assert_eq!(MovementDirection::Out.to_value(), "OUT");
        assert_eq!(MovementType::Purchase.to_value(), "PURCHASE");
        assert_eq!(MovementType::Sales.to_value(), "SALES");
        assert_eq!(MovementType::Transfer.to_value(), "TRANSFER");
        assert_eq!(MovementType::Adjustment.to_value(), "ADJUSTMENT");
    }

    #[test]
    fn movement_enums_reject_unknown_encodings() {
        assert!(MovementDirection::try_from_value(&"in".to_string()).is_err());
        assert!(MovementType::try_from_value(&"Purchase".to_string()).is_err());
    }
}
