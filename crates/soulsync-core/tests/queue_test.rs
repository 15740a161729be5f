//! Queue ordering and decision races.

mod common;

use common::{config, harness, harness_with, RecordingSender, T0};
use soulsync_core::{
    AlertOutcome, CaseStatus, Confidence, Decision, DeploymentMode, EscalationCaseDraft, RiskAssessment,
    RiskCategory,
};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

fn draft(user: &str) -> EscalationCaseDraft {
    EscalationCaseDraft {
        user_id: user.to_string(),
        user_name: "Alex".to_string(),
        risk_assessment: RiskAssessment {
            category: RiskCategory::Anxiety,
            source_text: "I'm anxious".to_string(),
            display_text: "I'm anxious".to_string(),
            confidence: Confidence::RegexMatch,
        },
        message_content: "I'm anxious".to_string(),
        emergency_contact_name: None,
        emergency_contact_phone: "chat-1".to_string(),
    }
}

#[test]
fn pending_list_follows_creation_time() {
    let h = harness(DeploymentMode::Moderated);
    let queue = h.store.queue().unwrap();
    let c = queue.enqueue(draft("c"), T0 + 30).unwrap();
    let a = queue.enqueue(draft("a"), T0 + 10).unwrap();
    let b = queue.enqueue(draft("b"), T0 + 20).unwrap();

    let ids: Vec<Uuid> = queue.list_pending().unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);

    queue.resolve(b.id, Decision::Approve, T0 + 40).unwrap();
    let ids: Vec<Uuid> = queue.list_pending().unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![a.id, c.id]);
}

#[test]
fn concurrent_enqueues_keep_a_total_order() {
    let h = harness(DeploymentMode::Moderated);
    let queue = h.store.queue().unwrap();

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let q = queue.clone();
            std::thread::spawn(move || {
                (0..10)
                    .map(|i| q.enqueue(draft(&format!("u{t}-{i}")), T0 + (i % 3) as i64).unwrap().id)
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut all = HashSet::new();
    for t in threads {
        all.extend(t.join().unwrap());
    }

    let listed = queue.list_pending().unwrap();
    assert_eq!(listed.len(), 80);
    assert_eq!(listed.iter().map(|c| c.id).collect::<HashSet<_>>(), all);
    for pair in listed.windows(2) {
        let left = (pair[0].created_at_ms, pair[0].id.to_string());
        let right = (pair[1].created_at_ms, pair[1].id.to_string());
        assert!(left < right, "{left:?} !< {right:?}");
    }
    // Same answer on a second read.
    let again: Vec<Uuid> = queue.list_pending().unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(again, listed.iter().map(|c| c.id).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_approve_and_reject_resolve_once() {
    let h = harness_with(
        config(DeploymentMode::Moderated),
        RecordingSender::with_delay(Duration::from_millis(5)),
        |o| o,
    );
    h.grant_consent("u1");

    for round in 0..10 {
        h.clock.advance(2 * common::HOUR);
        let r = h.orchestrator.handle_turn(&h.turn("u1", "I want to die")).await.unwrap();
        assert_eq!(r.alert_outcome, AlertOutcome::Queued);
        let case_id = r.case_id.unwrap();
        let before = h.sender.count();

        let a1 = {
            let o = h.orchestrator.clone();
            tokio::spawn(async move { o.approve(case_id).await.unwrap() })
        };
        let r1 = {
            let o = h.orchestrator.clone();
            tokio::spawn(async move { o.reject(case_id).await.unwrap() })
        };
        let a2 = {
            let o = h.orchestrator.clone();
            tokio::spawn(async move { o.approve(case_id).await.unwrap() })
        };
        let results = [a1.await.unwrap(), r1.await.unwrap(), a2.await.unwrap()];

        let winners: Vec<_> = results.iter().filter(|r| !r.already_terminal).collect();
        assert_eq!(winners.len(), 1, "round {round}");
        let final_status = winners[0].status;
        assert!(results.iter().all(|r| r.status == final_status), "round {round}");

        let sends = h.sender.count() - before;
        match final_status {
            CaseStatus::Approved => assert_eq!(sends, 1, "round {round}"),
            CaseStatus::Rejected => assert_eq!(sends, 0, "round {round}"),
            CaseStatus::Pending => panic!("case left pending"),
        }
    }
}
