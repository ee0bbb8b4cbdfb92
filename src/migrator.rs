use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_bills_table::Migration),
            Box::new(m20240101_000003_create_bill_items_table::Migration),
        ]
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Name,
    Price,
    Quantity,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Bills {
    Table,
    Id,
    TotalAmount,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BillItems {
    Table,
    Id,
    BillId,
    Sno,
    ProductId,
    ProductName,
    Quantity,
    Price,
    Total,
}

mod m20240101_000001_create_products_table {
    use super::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Products::Name)
                                .string_len(255)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_created_at")
                        .table(Products::Table)
                        .col(Products::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }
}

mod m20240101_000002_create_bills_table {
    use super::Bills;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_bills_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Bills::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Bills::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Bills::TotalAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bills::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // History is read newest first
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bills_created_at")
                        .table(Bills::Table)
                        .col(Bills::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Bills::Table).to_owned())
                .await
        }
    }
}

mod m20240101_000003_create_bill_items_table {
    use super::{BillItems, Bills, Products};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_bill_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BillItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BillItems::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(BillItems::BillId).uuid().not_null())
                        .col(ColumnDef::new(BillItems::Sno).integer().not_null())
                        .col(ColumnDef::new(BillItems::ProductId).uuid().null())
                        .col(
                            ColumnDef::new(BillItems::ProductName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(BillItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(BillItems::Price)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BillItems::Total)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bill_items_bill_id")
                                .from(BillItems::Table, BillItems::BillId)
                                .to(Bills::Table, Bills::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        // Deleting a product keeps its sold lines
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bill_items_product_id")
                                .from(BillItems::Table, BillItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bill_items_bill_id_sno")
                        .table(BillItems::Table)
                        .col(BillItems::BillId)
                        .col(BillItems::Sno)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BillItems::Table).to_owned())
                .await
        }
    }
}
