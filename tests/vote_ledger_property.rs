//! Property-based tests for the vote ledger
//!
//! Whatever sequence of casts happens, the cached aggregate on a target must
//! equal the sum of its live ledger rows, and each user holds at most one
//! live vote per target.

use proptest::prelude::*;
use qna::*;

const USERS: usize = 4;

/// One cast: which user, which target (0 = question, 1 = answer), which way.
fn cast_strategy() -> impl Strategy<Value = (usize, u8, bool)> {
    (0..USERS, 0u8..2, any::<bool>())
}

struct Fixture {
    service: ForumService,
    sessions: Vec<Session>,
    targets: [VoteTarget; 2],
}

fn fixture() -> Fixture {
    let service = ForumService::new(Database::in_memory().unwrap());

    let asker = UserId::random();
    service.create_profile(asker, "asker", "").unwrap();
    let asker = Session::signed_in(asker);
    let question = service
        .post_question(&asker, &NewQuestion::new("Q", "body", ["rust"]))
        .unwrap();
    let answer = service.post_answer(&asker, question.id, "answer").unwrap();

    let sessions = (0..USERS)
        .map(|i| {
            let id = UserId::random();
            service.create_profile(id, &format!("voter{i}"), "").unwrap();
            Session::signed_in(id)
        })
        .collect();

    Fixture {
        service,
        sessions,
        targets: [
            VoteTarget::Question(question.id),
            VoteTarget::Answer(answer.id),
        ],
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: cached vote_count == SUM(vote_type) over the ledger
    #[test]
    fn cached_aggregate_matches_ledger(casts in prop::collection::vec(cast_strategy(), 0..40)) {
        let f = fixture();

        for (user, target, up) in casts {
            let vote_type = if up { VoteType::Up } else { VoteType::Down };
            let target = f.targets[target as usize];
            let outcome = f.service.cast_vote(&f.sessions[user], target, vote_type).unwrap();

            prop_assert_eq!(outcome.vote_count, f.service.vote_tally(target).unwrap());
        }

        for target in f.targets {
            let cached = f.service.vote_count(target).unwrap();
            let ledger = f.service.ledger(target).unwrap();
            let sum: i64 = ledger.iter().map(|v| v.vote_type.value()).sum();

            prop_assert_eq!(cached, sum);
            prop_assert!(ledger.len() <= USERS);
        }
        prop_assert!(f.service.audit_counters().unwrap().is_consistent());
    }

    /// Property: a user's live vote follows the toggle rules
    #[test]
    fn live_vote_follows_toggle_rules(directions in prop::collection::vec(any::<bool>(), 1..20)) {
        let f = fixture();
        let session = &f.sessions[0];
        let target = f.targets[0];
        let mut expected: Option<VoteType> = None;

        for up in directions {
            let requested = if up { VoteType::Up } else { VoteType::Down };
            expected = if expected == Some(requested) { None } else { Some(requested) };

            let outcome = f.service.cast_vote(session, target, requested).unwrap();
            prop_assert_eq!(outcome.current, expected);
            prop_assert_eq!(f.service.user_vote(session, target).unwrap(), expected);
            prop_assert_eq!(outcome.vote_count, expected.map_or(0, VoteType::value));
        }
    }
}
