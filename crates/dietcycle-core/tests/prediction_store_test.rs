//! Prediction Store: the single-current invariant, plan reads, and the
//! meal-name dedup source.

mod common;

use uuid::Uuid;

use dietcycle_core::CycleError;
use dietcycle_core::prediction::PredictionMetrics;
use dietcycle_db::queries::predictions;

use common::{TestEnv, meal, sample_profile};

fn metrics() -> PredictionMetrics {
    PredictionMetrics {
        bmr: 1600.0,
        tdee: 2200.0,
        bmi: 22.86,
        calorie_target: 1800.0,
        expected_weight: 69.22,
        weight_change: -0.78,
    }
}

async fn current_count(env: &TestEnv, cycle_id: Uuid) -> usize {
    predictions::list_predictions_for_cycle(&env.pool, cycle_id)
        .await
        .unwrap()
        .iter()
        .filter(|p| p.is_current)
        .count()
}

#[tokio::test]
async fn create_prediction_supersedes_previous() {
    let env = TestEnv::new().await;
    let user = env.user("Hana").await;
    let cycle = env
        .service
        .cycles()
        .create_cycle(user.id, &sample_profile())
        .await
        .unwrap();
    let store = env.service.predictions();

    let first = store
        .create_prediction(user.id, cycle.id, &metrics(), &[meal("Poha"), meal("Idli")])
        .await
        .unwrap();
    let second = store
        .create_prediction(user.id, cycle.id, &metrics(), &[meal("Upma")])
        .await
        .unwrap();

    assert_eq!(current_count(&env, cycle.id).await, 1);

    let current = store.get_current_prediction(user.id).await.unwrap();
    assert_eq!(current.prediction.id, second.prediction.id);
    assert_eq!(current.meals.len(), 1);

    let old = store.get_plan(user.id, first.prediction.id).await.unwrap();
    assert!(!old.prediction.is_current);
    let names: Vec<&str> = old.meals.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Poha", "Idli"]);
    assert_eq!(old.meals[1].position, 1);

    env.teardown().await;
}

#[tokio::test]
async fn foreign_cycle_is_not_found_and_nothing_written() {
    let env = TestEnv::new().await;
    let owner = env.user("Ivan").await;
    let intruder = env.user("Jade").await;
    let cycle = env
        .service
        .cycles()
        .create_cycle(owner.id, &sample_profile())
        .await
        .unwrap();

    let err = env
        .service
        .predictions()
        .create_prediction(intruder.id, cycle.id, &metrics(), &[meal("Poha")])
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::NotFound(_)), "got {err:?}");
    assert_eq!(
        predictions::count_predictions_for_user(&env.pool, intruder.id)
            .await
            .unwrap(),
        0
    );

    env.teardown().await;
}

#[tokio::test]
async fn prediction_on_inactive_cycle_is_rejected() {
    let env = TestEnv::new().await;
    let user = env.user("Kofi").await;

    let (old, _) = env
        .service
        .start_cycle(user.id, &sample_profile())
        .await
        .unwrap();
    assert!(env.service.predictions().get_current_prediction(user.id).await.is_ok());

    // A new cycle without a plan leaves the old prediction flagged current
    // but attached to an inactive cycle.
    env.service
        .cycles()
        .create_cycle(user.id, &sample_profile())
        .await
        .unwrap();

    let err = env
        .service
        .predictions()
        .get_current_prediction(user.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::NotFound(_)), "got {err:?}");

    // The store refuses to make a plan on the old cycle current again.
    let err = env
        .service
        .predictions()
        .create_prediction(user.id, old.id, &metrics(), &[meal("Poha")])
        .await
        .unwrap_err();
    assert!(
        matches!(err, CycleError::Validation { field: "cycle_id", .. }),
        "got {err:?}"
    );
    assert_eq!(current_count(&env, old.id).await, 1);
    assert_eq!(
        predictions::list_predictions_for_cycle(&env.pool, old.id)
            .await
            .unwrap()
            .len(),
        1
    );

    env.teardown().await;
}

#[tokio::test]
async fn meal_names_span_all_cycles_and_are_normalized() {
    let env = TestEnv::new().await;
    let user = env.user("Lena").await;
    let store = env.service.predictions();

    let first = env
        .service
        .cycles()
        .create_cycle(user.id, &sample_profile())
        .await
        .unwrap();
    store
        .create_prediction(user.id, first.id, &metrics(), &[meal("  Masala OATS ")])
        .await
        .unwrap();

    let second = env
        .service
        .cycles()
        .create_cycle(user.id, &sample_profile())
        .await
        .unwrap();
    store
        .create_prediction(user.id, second.id, &metrics(), &[meal("Rajma Rice"), meal("masala oats")])
        .await
        .unwrap();

    let names = store.list_meal_names(user.id).await.unwrap();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    assert_eq!(names, vec!["masala oats", "rajma rice"]);

    env.teardown().await;
}

#[tokio::test]
async fn plans_of_other_users_are_hidden() {
    let env = TestEnv::new().await;
    let owner = env.user("Mira").await;
    let other = env.user("Nils").await;

    let (_, plan) = env
        .service
        .start_cycle(owner.id, &sample_profile())
        .await
        .unwrap();

    let err = env
        .service
        .predictions()
        .get_plan(other.id, plan.prediction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::NotFound(_)), "got {err:?}");

    env.teardown().await;
}
