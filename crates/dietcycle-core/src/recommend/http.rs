use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{Recommendation, RecommendError, RecommendationRequest, Recommender};

/// [`Recommender`] backed by the engine's `POST /recommend` endpoint.
///
/// Every call is bounded by the client-wide timeout; there is no other way
/// to cancel a plan request once it is in flight.
#[derive(Debug, Clone)]
pub struct HttpRecommender {
    client: Client,
    endpoint: String,
}

impl HttpRecommender {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RecommendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecommendError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/recommend", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Recommender for HttpRecommender {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Recommendation, RecommendError> {
        debug!(
            endpoint = %self.endpoint,
            excluded = request.exclude_recipe_names.len(),
            "requesting recommendation"
        );

        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecommendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| RecommendError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dietcycle_db::models::Goal;
    use mockito::Matcher;
    use serde_json::json;

    fn request() -> RecommendationRequest {
        RecommendationRequest {
            gender: 0,
            age: 29,
            height_cm: 165.0,
            weight_kg: 61.0,
            goal: Goal::Maintain,
            preferences: "vegetarian".into(),
            meal_type: "general".into(),
            meal_frequency: 2,
            health_conditions: vec![],
            activity_type: "yoga".into(),
            exclude_recipe_names: vec!["paneer wrap".into(), "veg pulao".into()],
        }
    }

    #[tokio::test]
    async fn posts_profile_and_parses_plan() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/recommend")
            .match_body(Matcher::PartialJson(json!({
                "Type": "vegetarian",
                "exclude_recipe_names": ["paneer wrap", "veg pulao"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "bmr": 1380.0,
                    "bmi": 22.41,
                    "calorie_target": 1794.0,
                    "diet_plan": [{"Name": "Chana Salad", "Calories (kcal)": 350.0}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = HttpRecommender::new(&server.url(), Duration::from_secs(5)).unwrap();
        let rec = client.recommend(&request()).await.expect("should succeed");

        mock.assert_async().await;
        assert_eq!(rec.calorie_target, Some(1794.0));
        assert_eq!(rec.meals[0].name, "Chana Salad");
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/recommend")
            .with_status(503)
            .with_body("model warming up")
            .create_async()
            .await;

        let client = HttpRecommender::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = client.recommend(&request()).await.unwrap_err();

        match err {
            RecommendError::Api { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "model warming up");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/recommend")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let client = HttpRecommender::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = client.recommend(&request()).await.unwrap_err();
        assert!(matches!(err, RecommendError::Parse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_engine_is_request_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = HttpRecommender::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.recommend(&request()).await.unwrap_err();
        assert!(
            matches!(err, RecommendError::Request(_) | RecommendError::Timeout),
            "got {err:?}"
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = HttpRecommender::new("http://engine:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint, "http://engine:8000/recommend");
    }
}
