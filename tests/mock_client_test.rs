#[cfg(feature = "mock")]
mod mock_tests {
    use lastfm_backup::{
        ApiPage, BackupCheckpoint, BackupDriver, BackupOptions, FavouritesOutcome, MemoryStore,
        MockLastFmApiClient, Result, RetryPolicy, ScrobbleMode, ScrobbleRecord,
    };

    fn options() -> BackupOptions {
        BackupOptions {
            retry: RetryPolicy::disabled(),
            ..BackupOptions::new("testuser")
        }
    }

    fn empty_page(page: u32) -> ApiPage {
        ApiPage {
            tracks: Vec::new(),
            page,
            total_pages: 0,
        }
    }

    #[tokio::test]
    async fn test_mock_favourites_short_circuit() -> Result<()> {
        let mut mock_client = MockLastFmApiClient::new();

        // Set up expectations
        mock_client.expect_loved_tracks_page().times(0);
        mock_client
            .expect_recent_tracks_page()
            .times(1)
            .returning(|query| Ok(empty_page(query.page)));

        let store = MemoryStore::new().with_favourites(Vec::new());
        let mut driver = BackupDriver::new(mock_client, store, options());

        let report = driver.run().await?;

        assert_eq!(report.favourites, FavouritesOutcome::Skipped);
        assert_eq!(report.scrobbles.mode, ScrobbleMode::Full);
        Ok(())
    }

    #[tokio::test]
    async fn test_mock_resume_requests_time_window() -> Result<()> {
        let mut mock_client = MockLastFmApiClient::new();

        let stored = vec![ScrobbleRecord {
            album: "Abbey Road".to_string(),
            artist: "The Beatles".to_string(),
            timestamp: 1640995200,
            name: "Come Together".to_string(),
        }];
        let checkpoint = BackupCheckpoint::new("testuser", 1, 5, &stored, false);

        mock_client
            .expect_recent_tracks_page()
            .withf(|query| query.page == 1 && query.to == Some(1640995199) && query.from.is_none())
            .times(1)
            .returning(|query| Ok(empty_page(query.page)));

        let store = MemoryStore::with_backup(Some(checkpoint), Some(stored));
        let mut driver = BackupDriver::new(mock_client, store, options());

        let summary = driver.backup_scrobbles().await?;

        assert_eq!(
            summary.mode,
            ScrobbleMode::Resume {
                cutoff: 1640995199
            }
        );
        assert_eq!(summary.total_records, 1);
        assert!(driver.store().checkpoint().unwrap().completed);
        Ok(())
    }
}
