use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_demand_observations_table::Migration),
            Box::new(m20240601_000002_create_demand_forecasts_table::Migration),
            Box::new(m20240601_000003_create_seasonal_patterns_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240601_000001_create_demand_observations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_demand_observations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::demand_observation Model
            manager
                .create_table(
                    Table::create()
                        .table(DemandObservations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DemandObservations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DemandObservations::ScopeKey).string().not_null())
                        .col(ColumnDef::new(DemandObservations::TenantId).string().not_null())
                        .col(ColumnDef::new(DemandObservations::ProductId).string().null())
                        .col(ColumnDef::new(DemandObservations::ObservedOn).date().not_null())
                        .col(ColumnDef::new(DemandObservations::Demand).double().not_null())
                        .col(
                            ColumnDef::new(DemandObservations::Imputed)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_demand_observations_scope_date")
                        .table(DemandObservations::Table)
                        .col(DemandObservations::ScopeKey)
                        .col(DemandObservations::ObservedOn)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_demand_observations_tenant")
                        .table(DemandObservations::Table)
                        .col(DemandObservations::TenantId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DemandObservations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DemandObservations {
        Table,
        Id,
        ScopeKey,
        TenantId,
        ProductId,
        ObservedOn,
        Demand,
        Imputed,
    }
}

mod m20240601_000002_create_demand_forecasts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_demand_forecasts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::demand_forecast Model
            manager
                .create_table(
                    Table::create()
                        .table(DemandForecasts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DemandForecasts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DemandForecasts::ScopeKey).string().not_null())
                        .col(ColumnDef::new(DemandForecasts::TenantId).string().not_null())
                        .col(ColumnDef::new(DemandForecasts::ProductId).string().null())
                        .col(ColumnDef::new(DemandForecasts::ForecastDate).date().not_null())
                        .col(ColumnDef::new(DemandForecasts::HorizonDays).integer().not_null())
                        .col(ColumnDef::new(DemandForecasts::LeadDays).integer().not_null())
                        .col(ColumnDef::new(DemandForecasts::Method).string().not_null())
                        .col(
                            ColumnDef::new(DemandForecasts::PredictedDemand)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DemandForecasts::ConfidenceLower)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DemandForecasts::ConfidenceUpper)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DemandForecasts::ConfidenceScore)
                                .double()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DemandForecasts::Trend).string().not_null())
                        .col(
                            ColumnDef::new(DemandForecasts::InsufficientHistory)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(DemandForecasts::GeneratedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DemandForecasts::ObservedActual).double().null())
                        .col(ColumnDef::new(DemandForecasts::AccuracyScore).double().null())
                        .col(
                            ColumnDef::new(DemandForecasts::ScoredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One live record per (scope, date, horizon)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_demand_forecasts_key")
                        .table(DemandForecasts::Table)
                        .col(DemandForecasts::ScopeKey)
                        .col(DemandForecasts::ForecastDate)
                        .col(DemandForecasts::HorizonDays)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DemandForecasts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DemandForecasts {
        Table,
        Id,
        ScopeKey,
        TenantId,
        ProductId,
        ForecastDate,
        HorizonDays,
        LeadDays,
        Method,
        PredictedDemand,
        ConfidenceLower,
        ConfidenceUpper,
        ConfidenceScore,
        Trend,
        InsufficientHistory,
        GeneratedAt,
        ObservedActual,
        AccuracyScore,
        ScoredAt,
    }
}

mod m20240601_000003_create_seasonal_patterns_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_seasonal_patterns_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::seasonal_pattern Model
            manager
                .create_table(
                    Table::create()
                        .table(SeasonalPatterns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SeasonalPatterns::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SeasonalPatterns::ScopeKey).string().not_null())
                        .col(ColumnDef::new(SeasonalPatterns::TenantId).string().not_null())
                        .col(ColumnDef::new(SeasonalPatterns::ProductId).string().null())
                        .col(ColumnDef::new(SeasonalPatterns::PatternType).string().not_null())
                        .col(ColumnDef::new(SeasonalPatterns::PeriodIndex).integer().not_null())
                        .col(
                            ColumnDef::new(SeasonalPatterns::DemandMultiplier)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SeasonalPatterns::ConfidenceScore)
                                .double()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SeasonalPatterns::SampleSize).integer().not_null())
                        .col(
                            ColumnDef::new(SeasonalPatterns::ComputedAt)
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
                        .name("idx_seasonal_patterns_scope")
                        .table(SeasonalPatterns::Table)
                        .col(SeasonalPatterns::ScopeKey)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SeasonalPatterns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SeasonalPatterns {
        Table,
        Id,
        ScopeKey,
        TenantId,
        ProductId,
        PatternType,
        PeriodIndex,
        DemandMultiplier,
        ConfidenceScore,
        SampleSize,
        ComputedAt,
    }
}
