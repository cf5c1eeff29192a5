use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum IpReputation {
    Table,
    Address,
    FailedAuthAttempts,
    RateLimitViolations,
    SuspiciousPatterns,
    RiskLevel,
    BlockedUntil,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IpReputation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IpReputation::Address)
                            .string_len(45)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IpReputation::FailedAuthAttempts)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(IpReputation::RateLimitViolations)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(IpReputation::SuspiciousPatterns)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(IpReputation::RiskLevel)
                            .string_len(16)
                            .not_null()
                            .default("low"),
                    )
                    .col(ColumnDef::new(IpReputation::BlockedUntil).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(IpReputation::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IpReputation::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Dashboard filters scan by tier and active blocks.
        manager
            .create_index(
                Index::create()
                    .name("idx_ip_reputation_risk_level")
                    .table(IpReputation::Table)
                    .col(IpReputation::RiskLevel)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_ip_reputation_blocked_until")
                    .table(IpReputation::Table)
                    .col(IpReputation::BlockedUntil)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IpReputation::Table).to_owned())
            .await
    }
}
