//! Concurrent writers on one database file.
//!
//! Each thread owns its own `Database` handle, the way separate processes
//! would. Aggregates must not lose updates and acceptance must have exactly
//! one winner.

use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::Result;
use qna::*;
use tempfile::tempdir;

const WRITERS: usize = 6;

struct Seed {
    asker: UserId,
    voters: Vec<UserId>,
    question: QuestionId,
    answers: Vec<AnswerId>,
}

fn seed(service: &ForumService) -> Result<Seed> {
    let asker = UserId::random();
    service.create_profile(asker, "asker", "")?;
    let question = service.post_question(
        &Session::signed_in(asker),
        &NewQuestion::new("Race", "Who wins?", ["concurrency"]),
    )?;

    let mut voters = Vec::new();
    let mut answers = Vec::new();
    for i in 0..WRITERS {
        let id = UserId::random();
        service.create_profile(id, &format!("writer{i}"), "")?;
        let answer =
            service.post_answer(&Session::signed_in(id), question.id, &format!("answer {i}"))?;
        voters.push(id);
        answers.push(answer.id);
    }

    Ok(Seed {
        asker,
        voters,
        question: question.id,
        answers,
    })
}

#[test]
fn concurrent_votes_are_all_counted() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("forum.db");
    let service = ForumService::new(Database::open(&path)?);
    let seed = seed(&service)?;
    let target = VoteTarget::Question(seed.question);

    // Open every handle up front so schema setup doesn't race the votes
    let handles: Vec<Database> = (0..WRITERS)
        .map(|_| Database::open(&path))
        .collect::<Result<_>>()?;
    let barrier = Arc::new(Barrier::new(WRITERS));

    let threads: Vec<_> = handles
        .into_iter()
        .zip(seed.voters.clone())
        .map(|(db, voter)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> qna::Result<i64> {
                let service = ForumService::new(db);
                let session = Session::signed_in(voter);
                barrier.wait();
                service.cast_vote(&session, target, VoteType::Up)?;
                service.cast_vote(&session, target, VoteType::Down)?;
                Ok(service.cast_vote(&session, target, VoteType::Up)?.vote_count)
            })
        })
        .collect();

    for handle in threads {
        handle.join().expect("writer panicked")?;
    }

    assert_eq!(service.vote_count(target)?, WRITERS as i64);
    assert_eq!(service.vote_tally(target)?, WRITERS as i64);
    assert!(service.audit_counters()?.is_consistent());
    Ok(())
}

#[test]
fn concurrent_accepts_have_exactly_one_winner() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("forum.db");
    let service = ForumService::new(Database::open(&path)?);
    let seed = seed(&service)?;

    let handles: Vec<Database> = (0..WRITERS)
        .map(|_| Database::open(&path))
        .collect::<Result<_>>()?;
    let barrier = Arc::new(Barrier::new(WRITERS));

    let threads: Vec<_> = handles
        .into_iter()
        .zip(seed.answers.clone())
        .map(|(db, answer)| {
            let barrier = Arc::clone(&barrier);
            let session = Session::signed_in(seed.asker);
            let question = seed.question;
            thread::spawn(move || -> qna::Result<bool> {
                let service = ForumService::new(db);
                barrier.wait();
                service.accept_answer(&session, question, answer)
            })
        })
        .collect();

    let mut winners = 0;
    for handle in threads {
        if handle.join().expect("accepter panicked")? {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let question = service.get_question(seed.question)?.expect("question exists");
    let accepted = question.accepted_answer_id.expect("one answer accepted");
    let flagged: Vec<AnswerId> = service
        .list_answers(seed.question)?
        .into_iter()
        .filter(|a| a.is_accepted)
        .map(|a| a.id)
        .collect();
    assert_eq!(flagged, vec![accepted]);
    Ok(())
}
