use std::sync::Arc;
use super::super::answer::{SkipRule, Submission, SubmissionOutcome};
use super::super::error::{ErrorKind, HuntError};
use super::super::hunt_manager::{HuntManager, HuntRules};
use super::super::store::tests::new_quest;
use super::super::store::{MemoryQuestStore, QuestStore};
use super::super::team::{TeamCredentials, TeamRegistry};
use super::super::upload::{DiskUploadStore, Upload, UploadError};

fn hunt(rules: HuntRules) -> (HuntManager, Arc<MemoryQuestStore>) {
    let store = Arc::new(MemoryQuestStore::new());
    store.insert_quest(new_quest("TEAM1", 1, "key")).unwrap();
    let mut photo = new_quest("TEAM1", 2, "done|finished");
    photo.file_required = true;
    store.insert_quest(photo).unwrap();
    store.insert_quest(new_quest("TEAM1", 3, "maze")).unwrap();
    store.insert_quest(new_quest("TEAM2", 1, "artifact")).unwrap();

    let registry = TeamRegistry::new(vec![
        TeamCredentials { name: "TEAM1".into(), username: "red".into(), password: "ruby".into() },
        TeamCredentials { name: "TEAM2".into(), username: "blue".into(), password: "sapphire".into() },
    ]);
    let manager = HuntManager::new(registry, store.clone(), rules);
    manager.login_at("red", "ruby", 0).unwrap();
    (manager, store)
}

fn ids(store: &MemoryQuestStore, team: &str) -> Vec<i64> {
    store.team_quests(team).unwrap().iter().map(|q| q.id).collect()
}

fn submission(quest_id: i64, answer: &str) -> Submission {
    Submission { quest_id, answer: answer.into(), upload: None }
}

#[test]
fn only_the_current_quest_accepts_answers() {
    let (manager, store) = hunt(HuntRules::default());
    let team1 = ids(&store, "TEAM1");
    let team2 = ids(&store, "TEAM2");

    let err = manager.submit_at("TEAM1", submission(team1[2], "maze"), 0).unwrap_err();
    assert!(matches!(err, HuntError::QuestNotCurrent { requested } if requested == team1[2]));
    assert_eq!(err.kind(), ErrorKind::Validation);

    // Another team's quest reads as unknown.
    assert!(matches!(manager.submit_at("TEAM1", submission(team2[0], "artifact"), 0), Err(HuntError::QuestNotFound(_))));
    assert!(matches!(manager.submit_at("TEAM1", submission(999, "key"), 0), Err(HuntError::QuestNotFound(999))));

    assert_eq!(manager.submit_at("TEAM1", submission(team1[0], "key"), 0).unwrap(), SubmissionOutcome::Completed { quest_number: 1 });
    assert_eq!(
        manager.submit_at("TEAM1", submission(team1[0], "skip"), 0).unwrap(),
        SubmissionOutcome::AlreadyCompleted { quest_number: 1 }
    );
    assert!(!store.quest_by_id("TEAM1", team1[0]).unwrap().unwrap().skipped);
}

#[test]
fn submissions_need_a_session() {
    let (manager, store) = hunt(HuntRules::default());
    let team2 = ids(&store, "TEAM2");
    let err = manager.submit_at("TEAM2", submission(team2[0], "artifact"), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authz);
}

#[test]
fn finished_team_cannot_submit() {
    let (manager, store) = hunt(HuntRules::default());
    let team1 = ids(&store, "TEAM1");
    manager.registry().mark_finished("TEAM1").unwrap();
    let err = manager.submit_at("TEAM1", submission(team1[0], "key"), 0).unwrap_err();
    assert!(matches!(err, HuntError::GameFinished));
    assert!(!store.quest_by_id("TEAM1", team1[0]).unwrap().unwrap().completed);
}

#[test]
fn required_photo_must_be_stored_before_completion() {
    let root = std::env::temp_dir().join(format!("hunt-submit-{}", uuid::Uuid::new_v4()));
    let (manager, store) = hunt(HuntRules::default());
    let manager = manager.with_uploads(Arc::new(DiskUploadStore::new(&root, 16)));
    let team1 = ids(&store, "TEAM1");
    manager.submit_at("TEAM1", submission(team1[0], "key"), 0).unwrap();

    let err = manager.submit_at("TEAM1", submission(team1[1], "done"), 0).unwrap_err();
    assert!(matches!(err, HuntError::Upload(UploadError::Missing)));

    let too_big = Submission {
        upload: Some(Upload { file_name: Some("team.jpg".into()), bytes: vec![0; 17] }),
        ..submission(team1[1], "done")
    };
    assert!(matches!(
        manager.submit_at("TEAM1", too_big, 0),
        Err(HuntError::Upload(UploadError::TooLarge { size: 17, limit: 16 }))
    ));
    assert!(!store.quest_by_id("TEAM1", team1[1]).unwrap().unwrap().completed);

    let good = Submission {
        upload: Some(Upload { file_name: Some("team.jpg".into()), bytes: vec![1; 8] }),
        ..submission(team1[1], "Finished")
    };
    assert_eq!(manager.submit_at("TEAM1", good, 0).unwrap(), SubmissionOutcome::Completed { quest_number: 2 });

    let stored: Vec<_> = std::fs::read_dir(&root).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].to_string_lossy().starts_with("TEAM1_quest2_"));
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn disabled_skip_rule_treats_skip_as_an_answer() {
    let rules = HuntRules { skip: SkipRule::disabled(), ..Default::default() };
    let (manager, store) = hunt(rules);
    let team1 = ids(&store, "TEAM1");
    assert_eq!(
        manager.submit_at("TEAM1", submission(team1[0], "skip"), 0).unwrap(),
        SubmissionOutcome::Incorrect { quest_number: 1 }
    );
}

#[test]
fn custom_skip_word() {
    let rules = HuntRules { skip: SkipRule::new(Some("Pass")), ..Default::default() };
    let (manager, store) = hunt(rules);
    let team1 = ids(&store, "TEAM1");
    assert_eq!(
        manager.submit_at("TEAM1", submission(team1[0], " pass "), 0).unwrap(),
        SubmissionOutcome::Skipped { quest_number: 1 }
    );
    let quest = store.quest_by_id("TEAM1", team1[0]).unwrap().unwrap();
    assert!(quest.skipped && quest.completed);
}

#[test]
fn wrong_login_is_rejected() {
    let (manager, _) = hunt(HuntRules::default());
    let err = manager.login_at("blue", "ruby", 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(!manager.registry().snapshot("TEAM2").unwrap().session_active);
}

#[test]
fn authorize_requires_matching_session() {
    let (manager, _) = hunt(HuntRules::default());
    assert_eq!(manager.authorize(Some("TEAM1"), "TEAM1").unwrap().name, "TEAM1");
    assert!(matches!(manager.authorize(Some("TEAM1"), "TEAM2"), Err(HuntError::Unauthorized(_))));
    assert!(matches!(manager.authorize(None, "TEAM1"), Err(HuntError::Unauthorized(_))));
}
