use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_catalog_tables::Migration),
            Box::new(m20260101_000002_create_shipping_tables::Migration),
            Box::new(m20260101_000003_create_order_tables::Migration),
            Box::new(m20260101_000004_create_coupon_tables::Migration),
            Box::new(m20260101_000005_create_wallet_tables::Migration),
            Box::new(m20260101_000006_create_wishlist_table::Migration),
        ]
    }
}

fn money<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .decimal_len(16, 4)
        .not_null()
        .default(0)
        .to_owned()
}

fn money_null<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).decimal_len(16, 4).null().to_owned()
}

fn flag<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .boolean()
        .not_null()
        .default(false)
        .to_owned()
}

fn timestamp<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .to_owned()
}

fn status<T: IntoIden>(col: T) -> ColumnDef {
    ColumnDef::new(col).string_len(32).not_null().to_owned()
}

mod m20260101_000001_create_catalog_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Sellers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sellers::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Sellers::Name).string().not_null())
                        .col(ColumnDef::new(Sellers::Email).string().null())
                        .col(status(Sellers::Status))
                        .col(flag(Sellers::VatRegistered))
                        .col(money_null(Sellers::CommissionRate))
                        .col(money(Sellers::Balance))
                        .col(timestamp(Sellers::CreatedAt))
                        .col(timestamp(Sellers::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Products::SellerId).uuid().null())
                        .col(flag(Products::IsPlatformProduct))
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(money(Products::BasePrice))
                        .col(
                            ColumnDef::new(Products::TotalStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::TotalSold)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(money_null(Products::WeightKg))
                        .col(flag(Products::IsFragile))
                        .col(status(Products::Status))
                        .col(status(Products::ModerationStatus))
                        .col(flag(Products::IsDeleted))
                        .col(timestamp(Products::CreatedAt))
                        .col(timestamp(Products::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_seller_id")
                        .table(Products::Table)
                        .col(Products::SellerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariants::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProductVariants::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(ProductVariants::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(money(ProductVariants::Price))
                        .col(
                            ColumnDef::new(ProductVariants::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ProductVariants::Attributes).json().null())
                        .col(timestamp(ProductVariants::CreatedAt))
                        .col(timestamp(ProductVariants::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_variants_product_id")
                        .table(ProductVariants::Table)
                        .col(ProductVariants::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sellers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Sellers {
        Table,
        Id,
        Name,
        Email,
        Status,
        VatRegistered,
        CommissionRate,
        Balance,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        SellerId,
        IsPlatformProduct,
        Name,
        CategoryId,
        BasePrice,
        TotalStock,
        TotalSold,
        WeightKg,
        IsFragile,
        Status,
        ModerationStatus,
        IsDeleted,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductVariants {
        Table,
        Id,
        ProductId,
        Sku,
        Price,
        Stock,
        Attributes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000002_create_shipping_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000002_create_shipping_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Addresses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Addresses::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Addresses::UserId).uuid().not_null())
                        .col(ColumnDef::new(Addresses::RecipientName).string().not_null())
                        .col(ColumnDef::new(Addresses::Phone).string().not_null())
                        .col(ColumnDef::new(Addresses::Street).string().not_null())
                        .col(ColumnDef::new(Addresses::Area).string().null())
                        .col(ColumnDef::new(Addresses::City).string().not_null())
                        .col(ColumnDef::new(Addresses::Region).string().null())
                        .col(timestamp(Addresses::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ShippingZones::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShippingZones::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ShippingZones::Code)
                                .string_len(16)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(ShippingZones::Name).string().not_null())
                        .col(money(ShippingZones::BaseRate))
                        .col(money(ShippingZones::PerKgRate))
                        .col(money(ShippingZones::ExpressMultiplier))
                        .col(money(ShippingZones::SameDayMultiplier))
                        .col(money(ShippingZones::FragileSurcharge))
                        .col(flag(ShippingZones::IsActive))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Neighborhoods::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Neighborhoods::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Neighborhoods::Name).string().not_null())
                        .col(ColumnDef::new(Neighborhoods::City).string().not_null())
                        .col(ColumnDef::new(Neighborhoods::ZoneCode).string_len(16).not_null())
                        .col(flag(Neighborhoods::IsRepresentative))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_neighborhoods_city")
                        .table(Neighborhoods::Table)
                        .col(Neighborhoods::City)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PickupCenters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PickupCenters::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(PickupCenters::Name).string().not_null())
                        .col(ColumnDef::new(PickupCenters::City).string().not_null())
                        .col(ColumnDef::new(PickupCenters::ZoneCode).string_len(16).not_null())
                        .col(flag(PickupCenters::IsActive))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PickupCenters::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Neighborhoods::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ShippingZones::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Addresses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Addresses {
        Table,
        Id,
        UserId,
        RecipientName,
        Phone,
        Street,
        Area,
        City,
        Region,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ShippingZones {
        Table,
        Id,
        Code,
        Name,
        BaseRate,
        PerKgRate,
        ExpressMultiplier,
        SameDayMultiplier,
        FragileSurcharge,
        IsActive,
    }

    #[derive(DeriveIden)]
    enum Neighborhoods {
        Table,
        Id,
        Name,
        City,
        ZoneCode,
        IsRepresentative,
    }

    #[derive(DeriveIden)]
    enum PickupCenters {
        Table,
        Id,
        Name,
        City,
        ZoneCode,
        IsActive,
    }
}

mod m20260101_000003_create_order_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::TrackingNumber).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::BuyerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::AddressId).uuid().not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).json().not_null())
                        .col(money(Orders::Subtotal))
                        .col(money(Orders::Discount))
                        .col(money(Orders::ShippingFee))
                        .col(money(Orders::TaxTotal))
                        .col(money(Orders::Total))
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(status(Orders::PaymentMethod))
                        .col(status(Orders::PaymentStatus))
                        .col(ColumnDef::new(Orders::PaymentReference).string().null())
                        .col(status(Orders::DeliveryMethod))
                        .col(status(Orders::DeliverySpeed))
                        .col(ColumnDef::new(Orders::PickupCenterId).uuid().null())
                        .col(status(Orders::CurrentStatus))
                        .col(ColumnDef::new(Orders::CouponCode).string().null())
                        .col(ColumnDef::new(Orders::CouponId).uuid().null())
                        .col(ColumnDef::new(Orders::SellerOrderIds).json().not_null())
                        .col(flag(Orders::StockReduced))
                        .col(flag(Orders::RevenueCredited))
                        .col(flag(Orders::IsArchived))
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(timestamp(Orders::CreatedAt))
                        .col(timestamp(Orders::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_buyer_id")
                        .table(Orders::Table)
                        .col(Orders::BuyerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SellerOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SellerOrders::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SellerOrders::OrderId).uuid().not_null())
                        .col(ColumnDef::new(SellerOrders::SellerId).uuid().not_null())
                        .col(ColumnDef::new(SellerOrders::ItemIds).json().not_null())
                        .col(money(SellerOrders::Subtotal))
                        .col(money(SellerOrders::Discount))
                        .col(money(SellerOrders::PlatformFundedDiscount))
                        .col(money(SellerOrders::ShippingFee))
                        .col(money(SellerOrders::TaxTotal))
                        .col(status(SellerOrders::VatCollector))
                        .col(money(SellerOrders::Total))
                        .col(money(SellerOrders::CommissionRate))
                        .col(money(SellerOrders::Commission))
                        .col(money(SellerOrders::CommissionVat))
                        .col(money(SellerOrders::PayoutAmount))
                        .col(status(SellerOrders::PayoutStatus))
                        .col(status(SellerOrders::DeliveryMethod))
                        .col(status(SellerOrders::Status))
                        .col(timestamp(SellerOrders::CreatedAt))
                        .col(timestamp(SellerOrders::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_seller_orders_order_id")
                        .table(SellerOrders::Table)
                        .col(SellerOrders::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::SellerOrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::SellerId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariantId).uuid().null())
                        .col(ColumnDef::new(OrderItems::Sku).string().null())
                        .col(ColumnDef::new(OrderItems::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderItems::VariantAttributes).json().null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(money(OrderItems::UnitPrice))
                        .col(money(OrderItems::BasePrice))
                        .col(money(OrderItems::VatAmount))
                        .col(money(OrderItems::VatRate))
                        .col(status(OrderItems::VatCollector))
                        .col(money(OrderItems::LineTotal))
                        .col(ColumnDef::new(OrderItems::Position).integer().not_null())
                        .col(timestamp(OrderItems::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderTrackingEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderTrackingEvents::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderTrackingEvents::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderTrackingEvents::Sequence).integer().not_null())
                        .col(status(OrderTrackingEvents::Status))
                        .col(ColumnDef::new(OrderTrackingEvents::Note).string().null())
                        .col(ColumnDef::new(OrderTrackingEvents::ActorId).uuid().null())
                        .col(status(OrderTrackingEvents::ActorRole))
                        .col(timestamp(OrderTrackingEvents::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_tracking_events_order_seq")
                        .table(OrderTrackingEvents::Table)
                        .col(OrderTrackingEvents::OrderId)
                        .col(OrderTrackingEvents::Sequence)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderDeletionAudits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderDeletionAudits::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderDeletionAudits::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderDeletionAudits::OrderNumber)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderDeletionAudits::DeletedBy).uuid().not_null())
                        .col(ColumnDef::new(OrderDeletionAudits::Snapshot).json().not_null())
                        .col(timestamp(OrderDeletionAudits::CreatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                OrderDeletionAudits::Table.into_iden(),
                OrderTrackingEvents::Table.into_iden(),
                OrderItems::Table.into_iden(),
                SellerOrders::Table.into_iden(),
                Orders::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        TrackingNumber,
        BuyerId,
        AddressId,
        ShippingAddress,
        Subtotal,
        Discount,
        ShippingFee,
        TaxTotal,
        Total,
        Currency,
        PaymentMethod,
        PaymentStatus,
        PaymentReference,
        DeliveryMethod,
        DeliverySpeed,
        PickupCenterId,
        CurrentStatus,
        CouponCode,
        CouponId,
        SellerOrderIds,
        StockReduced,
        RevenueCredited,
        IsArchived,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SellerOrders {
        Table,
        Id,
        OrderId,
        SellerId,
        ItemIds,
        Subtotal,
        Discount,
        PlatformFundedDiscount,
        ShippingFee,
        TaxTotal,
        VatCollector,
        Total,
        CommissionRate,
        Commission,
        CommissionVat,
        PayoutAmount,
        PayoutStatus,
        DeliveryMethod,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        SellerOrderId,
        SellerId,
        ProductId,
        VariantId,
        Sku,
        ProductName,
        VariantAttributes,
        Quantity,
        UnitPrice,
        BasePrice,
        VatAmount,
        VatRate,
        VatCollector,
        LineTotal,
        Position,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderTrackingEvents {
        Table,
        Id,
        OrderId,
        Sequence,
        Status,
        Note,
        ActorId,
        ActorRole,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderDeletionAudits {
        Table,
        Id,
        OrderId,
        OrderNumber,
        DeletedBy,
        Snapshot,
        CreatedAt,
    }
}

mod m20260101_000004_create_coupon_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000004_create_coupon_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CouponBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CouponBatches::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CouponBatches::Name).string().not_null())
                        .col(status(CouponBatches::DiscountType))
                        .col(money(CouponBatches::DiscountValue))
                        .col(money_null(CouponBatches::MaxDiscountAmount))
                        .col(money_null(CouponBatches::MinOrderAmount))
                        .col(timestamp(CouponBatches::ValidFrom))
                        .col(timestamp(CouponBatches::ExpiresAt))
                        .col(ColumnDef::new(CouponBatches::MaxUsage).integer().null())
                        .col(
                            ColumnDef::new(CouponBatches::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(CouponBatches::MaxUsagePerUser).integer().null())
                        .col(flag(CouponBatches::SingleUseCodes))
                        .col(ColumnDef::new(CouponBatches::ApplicableProducts).json().not_null())
                        .col(
                            ColumnDef::new(CouponBatches::ApplicableCategories)
                                .json()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CouponBatches::ApplicableSellers).json().not_null())
                        .col(ColumnDef::new(CouponBatches::SellerId).uuid().null())
                        .col(status(CouponBatches::FundedBy))
                        .col(flag(CouponBatches::IsActive))
                        .col(timestamp(CouponBatches::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Coupons::BatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(Coupons::Code)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Coupons::RecipientId).uuid().null())
                        .col(flag(Coupons::Used))
                        .col(
                            ColumnDef::new(Coupons::UsedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Coupons::UsedBy).uuid().null())
                        .col(ColumnDef::new(Coupons::OrderId).uuid().null())
                        .col(
                            ColumnDef::new(Coupons::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(timestamp(Coupons::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CouponUsages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CouponUsages::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CouponUsages::BatchId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::CouponId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::UserId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::OrderId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::UserSlot).integer().null())
                        .col(money(CouponUsages::Discount))
                        .col(timestamp(CouponUsages::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_usages_coupon_order")
                        .table(CouponUsages::Table)
                        .col(CouponUsages::CouponId)
                        .col(CouponUsages::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_usages_batch_user_slot")
                        .table(CouponUsages::Table)
                        .col(CouponUsages::BatchId)
                        .col(CouponUsages::UserId)
                        .col(CouponUsages::UserSlot)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CouponUsages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CouponBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CouponBatches {
        Table,
        Id,
        Name,
        DiscountType,
        DiscountValue,
        MaxDiscountAmount,
        MinOrderAmount,
        ValidFrom,
        ExpiresAt,
        MaxUsage,
        UsageCount,
        MaxUsagePerUser,
        SingleUseCodes,
        ApplicableProducts,
        ApplicableCategories,
        ApplicableSellers,
        SellerId,
        FundedBy,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
        BatchId,
        Code,
        RecipientId,
        Used,
        UsedAt,
        UsedBy,
        OrderId,
        UsageCount,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum CouponUsages {
        Table,
        Id,
        BatchId,
        CouponId,
        UserId,
        OrderId,
        UserSlot,
        Discount,
        CreatedAt,
    }
}

mod m20260101_000005_create_wallet_tables {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000005_create_wallet_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Wallets::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Wallets::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Wallets::UserId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(money(Wallets::Balance))
                        .col(money(Wallets::HoldAmount))
                        .col(ColumnDef::new(Wallets::Currency).string_len(3).not_null())
                        .col(timestamp(Wallets::CreatedAt))
                        .col(timestamp(Wallets::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WalletTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WalletTransactions::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(WalletTransactions::WalletId).uuid().not_null())
                        .col(ColumnDef::new(WalletTransactions::UserId).uuid().not_null())
                        .col(status(WalletTransactions::Kind))
                        .col(money(WalletTransactions::Amount))
                        .col(money(WalletTransactions::BalanceAfter))
                        .col(
                            ColumnDef::new(WalletTransactions::Reference)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(WalletTransactions::Description).string().not_null())
                        .col(timestamp(WalletTransactions::CreatedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WalletTransactions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Wallets::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Wallets {
        Table,
        Id,
        UserId,
        Balance,
        HoldAmount,
        Currency,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum WalletTransactions {
        Table,
        Id,
        WalletId,
        UserId,
        Kind,
        Amount,
        BalanceAfter,
        Reference,
        Description,
        CreatedAt,
    }
}

mod m20260101_000006_create_wishlist_table {
    use super::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000006_create_wishlist_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WishlistItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WishlistItems::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(WishlistItems::UserId).uuid().not_null())
                        .col(ColumnDef::new(WishlistItems::ProductId).uuid().not_null())
                        .col(timestamp(WishlistItems::CreatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_wishlist_items_user_product")
                        .table(WishlistItems::Table)
                        .col(WishlistItems::UserId)
                        .col(WishlistItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WishlistItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WishlistItems {
        Table,
        Id,
        UserId,
        ProductId,
        CreatedAt,
    }
}
