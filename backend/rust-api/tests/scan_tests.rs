mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;
use exam_grading_api::models::{Exam, ScanResult};

async fn paper_exam(app: &TestApp) -> Exam {
    let exam = app.seed_exam(true).await;
    let (status, _) = app
        .send(
            "PUT",
            &format!("/api/v1/exams/{}/answer-keys", exam.id),
            Some(&app.teacher()),
            Some(common::key_body(&[(2, 1.0), (4, 1.0), (1, 2.0), (3, 1.0)])),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    exam
}

fn sheet(marks: Vec<u8>, right: Vec<u32>, wrong: Vec<u32>, qr: Option<&str>) -> ScanResult {
    ScanResult {
        right_answers: right,
        wrong_answers: wrong,
        user_answers: marks,
        qr_code_data: qr.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_scan_sheet_grades_against_key() {
    let app = common::create_test_app().await;
    let exam = paper_exam(&app).await;
    app.scanner.on(
        "sheets/p1.png",
        ScanResult {
            multiple_answers: vec![4],
            unanswered: vec![],
            ..sheet(vec![2, 1, 1, 5], vec![1, 3], vec![2], None)
        },
    );

    let (status, record) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/scans", exam.id),
            Some(&app.teacher()),
            Some(json!({ "participantId": "p1", "imagePath": "sheets/p1.png" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["participantId"], "p1");
    assert_eq!(record["gradingStatus"], "scanned");
    assert_eq!(record["sumScore"], 3.0);
    assert_eq!(record["maxScore"], 5.0);
    assert_eq!(record["correctAnswerCount"], 2);
    assert_eq!(record["wrongAnswerCount"], 2);
    assert_eq!(record["scan"]["Useranswers"], json!([2, 1, 1, 5]));

    let calls = app.scanner.calls();
    assert_eq!(calls[0].expected, vec![2, 4, 1, 3]);
}

#[tokio::test]
async fn test_rescan_replaces_previous_result() {
    let app = common::create_test_app().await;
    let exam = paper_exam(&app).await;
    app.scanner
        .on("sheets/first.png", sheet(vec![2, 4, 1, 3], vec![1, 2, 3, 4], vec![], None));
    app.scanner
        .on("sheets/second.png", sheet(vec![2, 0, 0, 0], vec![1], vec![], None));
    let uri = format!("/api/v1/exams/{}/scans", exam.id);

    let (_, first) = app
        .send(
            "POST",
            &uri,
            Some(&app.teacher()),
            Some(json!({ "participantId": "p1", "imagePath": "sheets/first.png" })),
        )
        .await;
    assert_eq!(first["sumScore"], 5.0);

    let (status, second) = app
        .send(
            "POST",
            &uri,
            Some(&app.teacher()),
            Some(json!({ "participantId": "p1", "imagePath": "sheets/second.png" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["_id"], first["_id"]);
    assert_eq!(second["sumScore"], 1.0);
    assert_eq!(second["unansweredCount"], 3);
}

#[tokio::test]
async fn test_scan_without_answer_key_is_rejected() {
    let app = common::create_test_app().await;
    let exam = app.seed_exam(true).await;

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/scans", exam.id),
            Some(&app.teacher()),
            Some(json!({ "participantId": "p1", "imagePath": "sheets/p1.png" })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(app.scanner.calls().is_empty());
}

#[tokio::test]
async fn test_batch_scan_isolates_failing_sheets() {
    let app = common::create_test_app().await;
    let exam = paper_exam(&app).await;
    app.scanner.on(
        "batch/a.png",
        sheet(vec![2, 4, 1, 3], vec![1, 2, 3, 4], vec![], Some("p1-MATH-F")),
    );
    app.scanner
        .on("batch/b.png", sheet(vec![1, 4, 0, 0], vec![2], vec![1], Some("p2")));
    app.scanner
        .on("batch/c.png", sheet(vec![2, 4, 1, 3], vec![1, 2, 3, 4], vec![], None));
    app.scanner.fail("batch/d.png", "scanner timed out after 60s");

    let (status, report) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/scans/batch", exam.id),
            Some(&app.teacher()),
            Some(json!({
                "imagePaths": ["batch/a.png", "batch/b.png", "batch/c.png", "batch/d.png"]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total"], 4);

    let graded = report["graded"].as_array().unwrap();
    assert_eq!(graded.len(), 2);
    assert_eq!(graded[0]["participantId"], "p1");
    assert_eq!(graded[0]["sumScore"], 5.0);
    assert_eq!(graded[1]["participantId"], "p2");
    assert_eq!(graded[1]["sumScore"], 1.0);

    let failed = report["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0]["imagePath"], "batch/c.png");
    assert_eq!(failed[1]["imagePath"], "batch/d.png");
    assert_eq!(failed[1]["error"], "scanner timed out after 60s");

    assert!(app.store.find_attempt(&exam.id, "p2").await.unwrap().is_some());
}

#[tokio::test]
async fn test_batch_size_is_validated() {
    let app = common::create_test_app().await;
    let exam = paper_exam(&app).await;

    let (status, json) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/scans/batch", exam.id),
            Some(&app.teacher()),
            Some(json!({ "imagePaths": [] })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["issues"][0]["field"], "imagePaths");
}

#[tokio::test]
async fn test_manual_scan_result_is_stored() {
    let app = common::create_test_app().await;
    let exam = paper_exam(&app).await;

    let (status, record) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/scans/manual", exam.id),
            Some(&app.teacher()),
            Some(json!({
                "participantId": "p7",
                "scanResult": {
                    "rightAnswers": [1, 3],
                    "wrongAnswers": [2],
                    "multipleAnswers": [],
                    "unAnswered": [4],
                    "Useranswers": [2, 3, 1, 0],
                    "correctedImageUrl": "/processed/p7.png"
                }
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["sumScore"], 3.0);
    assert_eq!(record["unansweredCount"], 1);
    assert_eq!(record["scan"]["correctedImageUrl"], "/processed/p7.png");
    assert!(app.scanner.calls().is_empty());
}

#[tokio::test]
async fn test_sheet_rows_follow_question_numbers_when_key_has_gap() {
    let app = common::create_test_app().await;
    let exam = app.seed_exam(true).await;
    // Entry 2 has an out-of-range option and is skipped.
    let (status, _) = app
        .send(
            "PUT",
            &format!("/api/v1/exams/{}/answer-keys", exam.id),
            Some(&app.teacher()),
            Some(common::key_body(&[(1, 1.0), (9, 1.0), (3, 2.0)])),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    app.scanner
        .on("sheets/gap.png", sheet(vec![1, 2, 3], vec![1, 3], vec![2], None));

    let (status, record) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/scans", exam.id),
            Some(&app.teacher()),
            Some(json!({ "participantId": "p1", "imagePath": "sheets/gap.png" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.scanner.calls()[0].expected, vec![1, 1, 3]);
    assert_eq!(record["sumScore"], 3.0);
    assert_eq!(record["maxScore"], 3.0);
    assert_eq!(record["correctAnswerCount"], 2);
    assert_eq!(record["answers"][1]["value"], "3");
}

#[tokio::test]
async fn test_manual_scan_trusts_lists_over_short_marks() {
    let app = common::create_test_app().await;
    let exam = paper_exam(&app).await;

    let (status, record) = app
        .send(
            "POST",
            &format!("/api/v1/exams/{}/scans/manual", exam.id),
            Some(&app.teacher()),
            Some(json!({
                "participantId": "p8",
                "scanResult": {
                    "rightAnswers": [1, 2, 3],
                    "wrongAnswers": [4],
                    "multipleAnswers": [],
                    "unAnswered": [],
                    "Useranswers": [2]
                }
            })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["sumScore"], 4.0);
    assert_eq!(record["correctAnswerCount"], 3);
    assert_eq!(record["wrongAnswerCount"], 1);
    assert_eq!(record["unansweredCount"], 0);
}
