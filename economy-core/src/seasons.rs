//! Season administration
//!
//! Status changes are serialized through the engine's season lock so that at
//! most one season is active at any time. The admin log entry is written in
//! the same batch as the season itself.

use crate::{
    admin::require_admin,
    types::{Season, SeasonStatus},
    Engine, Error, Result,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

fn check_transition(from: SeasonStatus, to: SeasonStatus) -> Result<()> {
    match (from, to) {
        (SeasonStatus::Upcoming, SeasonStatus::Active)
        | (SeasonStatus::Upcoming, SeasonStatus::Ended)
        | (SeasonStatus::Active, SeasonStatus::Ended) => Ok(()),
        _ => Err(Error::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

impl Engine {
    /// Create a season
    pub fn create_season(
        &self,
        admin_id: &str,
        name: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        status: SeasonStatus,
    ) -> Result<Season> {
        require_admin(admin_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Season name is empty".to_string()));
        }
        if end_date <= start_date {
            return Err(Error::InvalidInput(format!(
                "Season must end after it starts ({} .. {})",
                start_date, end_date
            )));
        }

        let season = {
            let _guard = self.season_lock.lock();
            if status == SeasonStatus::Active {
                if let Some(active) = self.active_season()? {
                    return Err(Error::SeasonConflict(active.name));
                }
            }
            let season = Season {
                id: Uuid::now_v7(),
                name: name.to_string(),
                start_date,
                end_date,
                status,
                created_at: self.now(),
            };
            let entry = self.admin_entry(
                admin_id,
                "create_season",
                format!("{} '{}' {}", season.id, season.name, season.status),
            )?;
            self.ledger().put_season(&season, Some(&entry))?;
            season
        };

        tracing::info!(season_id = %season.id, name = %season.name, status = %season.status, "Season created");
        Ok(season)
    }

    /// The running season, if any
    pub fn active_season(&self) -> Result<Option<Season>> {
        Ok(self
            .ledger()
            .seasons()?
            .into_iter()
            .find(|season| season.status == SeasonStatus::Active))
    }

    /// All seasons, latest start first
    pub fn list_seasons(&self) -> Result<Vec<Season>> {
        let mut seasons = self.ledger().seasons()?;
        seasons.sort_by(|a, b| b.start_date.cmp(&a.start_date).then_with(|| b.id.cmp(&a.id)));
        Ok(seasons)
    }

    /// Move a season forward (`upcoming -> active -> ended`)
    ///
    /// Setting the current status again is a no-op.
    pub fn set_season_status(
        &self,
        admin_id: &str,
        season_id: Uuid,
        status: SeasonStatus,
    ) -> Result<Season> {
        require_admin(admin_id)?;
        let _guard = self.season_lock.lock();
        let mut season = self.ledger().season(season_id)?;
        if season.status == status {
            return Ok(season);
        }
        check_transition(season.status, status)?;
        if status == SeasonStatus::Active {
            if let Some(active) = self.active_season()? {
                return Err(Error::SeasonConflict(active.name));
            }
        }
        let from = season.status;
        season.status = status;
        let entry = self.admin_entry(
            admin_id,
            "set_season_status",
            format!("{} {} -> {}", season.id, from, status),
        )?;
        self.ledger().put_season(&season, Some(&entry))?;
        tracing::info!(season_id = %season.id, from = %from, to = %status, "Season status changed");
        Ok(season)
    }
}
