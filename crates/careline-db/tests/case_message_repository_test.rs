//! Integration tests for case message persistence.
//!
//! This test suite validates:
//! - Sender becomes a participant with a receipt for their own message
//! - Private messages are hidden from patient listings
//! - Media claims are taken atomically with the message insert
//! - Read marking is idempotent and drives the unread count
//!
//! **IMPORTANT**: These tests require a fully migrated PostgreSQL database.
//! Run migrations first: `sqlx migrate run`

use careline_db::{
    test_fixtures::{CaseFixture, TestDatabase},
    AttachmentInput, AttachmentType, CaseMessageRepository, ClaimerType, Error,
    ListCaseMessagesOptions, MediaClaim, MediaRepository, NewCaseMessage, PeopleRepository,
    RoleType,
};

fn new_message(case_id: i64, person_id: i64, body: &str) -> NewCaseMessage {
    NewCaseMessage {
        case_id,
        person_id,
        body: body.to_string(),
        is_private: false,
        event_text: None,
        attachments: Vec::new(),
        media_source: None,
    }
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_create_message_records_participant_and_receipt() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let fx = CaseFixture::create(db).await;

    let patient_person = db
        .people
        .person_id_for_role(RoleType::Patient, fx.patient.id)
        .await
        .unwrap();

    let msg = db
        .messages
        .create_message(&new_message(fx.case.id, patient_person, "I have a rash"))
        .await
        .unwrap();
    assert_eq!(msg.case_id, fx.case.id);

    let participants = db
        .messages
        .case_message_participants(fx.case.id, true)
        .await
        .unwrap();
    let me = participants.get(&patient_person).expect("sender is a participant");
    assert_eq!(me.profile.as_ref().unwrap().first_name, "Pat");

    assert_eq!(
        db.messages
            .unread_message_count(fx.case.id, patient_person)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_private_messages_hidden_from_patient_listing() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let fx = CaseFixture::create(db).await;

    let doctor_person = db
        .people
        .person_id_for_role(RoleType::Doctor, fx.doctor.id)
        .await
        .unwrap();

    let mut private_note = new_message(fx.case.id, doctor_person, "internal note");
    private_note.is_private = true;
    db.messages.create_message(&private_note).await.unwrap();
    db.messages
        .create_message(&new_message(fx.case.id, doctor_person, "Hello Pat"))
        .await
        .unwrap();

    let patient_view = db
        .messages
        .list_case_messages(fx.case.id, ListCaseMessagesOptions::for_viewer(RoleType::Patient))
        .await
        .unwrap();
    assert_eq!(patient_view.len(), 1);
    assert_eq!(patient_view[0].body, "Hello Pat");

    let cc_view = db
        .messages
        .list_case_messages(
            fx.case.id,
            ListCaseMessagesOptions::for_viewer(RoleType::CareCoordinator),
        )
        .await
        .unwrap();
    assert_eq!(cc_view.len(), 2);
    assert!(cc_view.iter().all(|m| !m.read_receipts.is_empty()));
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_media_claimed_once() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let fx = CaseFixture::create(db).await;

    let patient_person = db
        .people
        .person_id_for_role(RoleType::Patient, fx.patient.id)
        .await
        .unwrap();
    let media_id = db
        .media
        .add_media(patient_person, "s3://bucket/rash.jpg", "image/jpeg")
        .await
        .unwrap();

    let mut first = new_message(fx.case.id, patient_person, "photo");
    first.attachments = vec![AttachmentInput::new(AttachmentType::Photo, media_id)];
    let msg = db.messages.create_message(&first).await.unwrap();
    assert_eq!(msg.attachments[0].title, "Photo");
    assert_eq!(msg.attachments[0].mime_type.as_deref(), Some("image/jpeg"));
    assert!(db
        .media
        .media_has_claim(media_id, MediaClaim::new(ClaimerType::ConversationMessage, msg.id))
        .await
        .unwrap());

    let before = db
        .messages
        .list_case_messages(fx.case.id, ListCaseMessagesOptions::default())
        .await
        .unwrap()
        .len();

    let err = db.messages.create_message(&first).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // The failed insert rolled back with the claim.
    let after = db
        .messages
        .list_case_messages(fx.case.id, ListCaseMessagesOptions::default())
        .await
        .unwrap()
        .len();
    assert_eq!(before, after);
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_mark_read_is_idempotent() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let fx = CaseFixture::create(db).await;

    let patient_person = db
        .people
        .person_id_for_role(RoleType::Patient, fx.patient.id)
        .await
        .unwrap();
    let doctor_person = db
        .people
        .person_id_for_role(RoleType::Doctor, fx.doctor.id)
        .await
        .unwrap();

    for body in ["one", "two"] {
        db.messages
            .create_message(&new_message(fx.case.id, doctor_person, body))
            .await
            .unwrap();
    }
    assert_eq!(
        db.messages
            .unread_message_count(fx.case.id, patient_person)
            .await
            .unwrap(),
        2
    );

    db.messages
        .mark_case_messages_as_read(fx.case.id, patient_person)
        .await
        .unwrap();
    db.messages
        .mark_case_messages_as_read(fx.case.id, patient_person)
        .await
        .unwrap();

    assert_eq!(
        db.messages
            .unread_message_count(fx.case.id, patient_person)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_private_messages_skip_patient_unread_count() {
    let test_db = TestDatabase::new().await;
    let db = &test_db.db;
    let fx = CaseFixture::create(db).await;

    let patient_person = db
        .people
        .person_id_for_role(RoleType::Patient, fx.patient.id)
        .await
        .unwrap();
    let doctor_person = db
        .people
        .person_id_for_role(RoleType::Doctor, fx.doctor.id)
        .await
        .unwrap();

    let mut note = new_message(fx.case.id, doctor_person, "Discuss dosage with CC");
    note.is_private = true;
    db.messages.create_message(&note).await.unwrap();
    db.messages
        .create_message(&new_message(fx.case.id, doctor_person, "Results are in"))
        .await
        .unwrap();

    assert_eq!(
        db.messages
            .unread_message_count(fx.case.id, patient_person)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_unknown_message_lookup() {
    let test_db = TestDatabase::new().await;
    let err = test_db
        .db
        .messages
        .case_id_for_message(i64::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MessageNotFound(_)));
}
