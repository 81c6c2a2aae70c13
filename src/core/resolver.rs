use crate::domain::model::SourceReference;
use crate::utils::error::{Result, SyncError};
use chrono::{Duration, NaiveDate};
use reqwest::Client;
use url::Url;

/// Source files are published as `{base_url}/{MM-DD-YYYY}.csv`.
const DATE_FORMAT: &str = "%m-%d-%Y";

/// Finds the newest dated source file that actually exists. Upstream
/// publishers lag by at most a day, so the resolver probes today and falls
/// back exactly once to yesterday.
pub struct DateResolver {
    client: Client,
}

impl DateResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn resolve(&self, base_url: &str, today: NaiveDate) -> Result<SourceReference> {
        let mut network_error = None;

        for date in [today, today - Duration::days(1)] {
            let candidate = dated_url(base_url, date);
            match self.probe(&candidate).await {
                Ok(true) => {
                    let url = Url::parse(&candidate).map_err(|err| SyncError::Config {
                        message: format!("invalid source url {candidate}: {err}"),
                    })?;
                    return Ok(SourceReference::new(base_url, date, url));
                }
                Ok(false) => {
                    tracing::debug!(url = %candidate, "source file not present");
                }
                // A failed probe falls through to yesterday, but the error is
                // kept so operators can tell an outage from a missing file.
                Err(err) => {
                    tracing::warn!(url = %candidate, error = %err, "existence probe failed");
                    network_error = Some(err);
                }
            }
        }

        match network_error {
            Some(err) => Err(err),
            None => Err(SyncError::SourceNotFound {
                url: dated_url(base_url, today),
            }),
        }
    }

    /// Lightweight existence check; the body is never fetched.
    async fn probe(&self, url: &str) -> Result<bool> {
        let response = self.client.head(url).send().await?;
        Ok(response.status().is_success())
    }
}

fn dated_url(base_url: &str, date: NaiveDate) -> String {
    format!(
        "{}/{}.csv",
        base_url.trim_end_matches('/'),
        date.format(DATE_FORMAT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::HEAD;

    fn resolver() -> DateResolver {
        DateResolver::new(Client::new())
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn resolves_todays_file_without_fallback_probe() {
        let server = MockServer::start();
        let today_mock = server.mock(|when, then| {
            when.method(HEAD).path("/daily/03-15-2020.csv");
            then.status(200);
        });
        let yesterday_mock = server.mock(|when, then| {
            when.method(HEAD).path("/daily/03-14-2020.csv");
            then.status(404);
        });

        let source = resolver()
            .resolve(&server.url("/daily"), day(2020, 3, 15))
            .await
            .unwrap();

        today_mock.assert();
        yesterday_mock.assert_hits(0);
        assert!(source.url().as_str().ends_with("/daily/03-15-2020.csv"));
        assert_eq!(source.date(), day(2020, 3, 15));
    }

    #[tokio::test]
    async fn falls_back_to_yesterday_after_one_probe() {
        let server = MockServer::start();
        let today_mock = server.mock(|when, then| {
            when.method(HEAD).path("/daily/03-15-2020.csv");
            then.status(404);
        });
        let yesterday_mock = server.mock(|when, then| {
            when.method(HEAD).path("/daily/03-14-2020.csv");
            then.status(200);
        });

        let source = resolver()
            .resolve(&server.url("/daily"), day(2020, 3, 15))
            .await
            .unwrap();

        today_mock.assert_hits(1);
        yesterday_mock.assert_hits(1);
        assert_eq!(source.date(), day(2020, 3, 14));
        assert!(source.url().as_str().ends_with("/daily/03-14-2020.csv"));
    }

    #[tokio::test]
    async fn fails_with_source_not_found_when_neither_day_exists() {
        let server = MockServer::start();
        let today_mock = server.mock(|when, then| {
            when.method(HEAD).path("/daily/03-15-2020.csv");
            then.status(404);
        });
        let yesterday_mock = server.mock(|when, then| {
            when.method(HEAD).path("/daily/03-14-2020.csv");
            then.status(404);
        });

        let err = resolver()
            .resolve(&server.url("/daily"), day(2020, 3, 15))
            .await
            .unwrap_err();

        today_mock.assert_hits(1);
        yesterday_mock.assert_hits(1);
        assert!(matches!(err, SyncError::SourceNotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn transport_failures_surface_as_network_errors() {
        // nothing listens on the discard port, both probes get refused
        let err = resolver()
            .resolve("http://127.0.0.1:9", day(2020, 3, 15))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Network(_)), "got {err:?}");
    }
}
