use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ulid::Ulid;

use schedboard::engine::{
    Activity, Board, BoardSettings, EngineError, GestureKind, Notice, PointerPos, Release,
};
use schedboard::filter::AssignmentFilter;
use schedboard::limits::{HOUR_MS, MINUTE_MS};
use schedboard::model::*;
use schedboard::repository::{AssignmentRepository, ScheduleStore};

/// 2026-01-05T00:00:00Z, a Monday.
const DAY0: Ms = 1_767_571_200_000;

fn at(h: Ms, m: Ms) -> Ms {
    DAY0 + h * HOUR_MS + m * MINUTE_MS
}

fn journal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("schedboard_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn machine(code: &str) -> Machine {
    Machine {
        id: Ulid::new(),
        code: code.into(),
        name: format!("Press {code}"),
        group: Some("Line 1".into()),
    }
}

fn assignment(machine_id: Ulid, span: Span, job_code: &str) -> Assignment {
    Assignment {
        id: Ulid::new(),
        machine_id,
        job: JobRef {
            work_order_id: Ulid::new(),
            code: job_code.into(),
            item_code: "BOLT-M8".into(),
            customer: "Acme".into(),
            quantity_requested: 500,
        },
        span,
        status: AssignmentStatus::Scheduled,
        quantity_allocated: 500,
    }
}

async fn board_for(store: &Arc<ScheduleStore>) -> Board {
    let mut board = Board::new(store.clone(), BoardSettings::default(), at(7, 0));
    board.reload().await.unwrap();
    board
}

/// Handle activities until `board` has reloaded, or fail after a few seconds.
async fn until_reloaded(board: &mut Board) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match board.next_activity().await {
                Some(Activity::Reloaded) => return,
                Some(_) => continue,
                None => panic!("board stopped before reloading"),
            }
        }
    })
    .await
    .expect("no reload within 5s");
}

#[tokio::test]
async fn second_board_sees_first_boards_move() {
    let store = Arc::new(ScheduleStore::open(&journal_path("sync.journal")).unwrap());
    let p1 = machine("P1");
    let p2 = machine("P2");
    store.register_machine(p1.clone()).await.unwrap();
    store.register_machine(p2.clone()).await.unwrap();
    let a = assignment(p1.id, Span::new(at(8, 0), at(10, 0)), "WO-100");
    store.create_assignment(a.clone()).await.unwrap();

    let mut planner = board_for(&store).await;
    let mut viewer = board_for(&store).await;

    let release = planner.drop_on_column(a.id, p2.id).unwrap();
    assert!(matches!(release, Release::Pending(_)));
    let outcomes = planner.settle().await;
    assert!(outcomes[0].is_confirmed());

    until_reloaded(&mut viewer).await;
    let seen = viewer.snapshot().get(&a.id).unwrap();
    assert_eq!(seen.machine_id, p2.id);
    assert_eq!(seen.span, a.span);
    let columns = viewer.resource_board();
    assert!(columns[0].assignments.is_empty());
    assert_eq!(columns[1].assignments[0].id, a.id);
}

#[tokio::test]
async fn stale_board_rejects_move_after_reload() {
    let store = Arc::new(ScheduleStore::in_memory());
    let p1 = machine("P1");
    let p2 = machine("P2");
    store.register_machine(p1.clone()).await.unwrap();
    store.register_machine(p2.clone()).await.unwrap();
    let a = assignment(p1.id, Span::new(at(8, 0), at(10, 0)), "WO-1");
    let b = assignment(p2.id, Span::new(at(12, 0), at(13, 0)), "WO-2");
    store.create_assignment(a.clone()).await.unwrap();
    store.create_assignment(b.clone()).await.unwrap();

    let mut first = board_for(&store).await;
    let mut second = board_for(&store).await;

    // Second board starts dragging B toward P1 at 09:00.
    let origin = PointerPos::new(second.window().x_for(b.span.start), Some(p2.id));
    second.begin_gesture(b.id, GestureKind::Move, origin).unwrap();
    second
        .drag_to(PointerPos::new(second.window().x_for(at(10, 0)), Some(p1.id)))
        .unwrap();

    // Meanwhile the first board stretches A to 10:30.
    let edge = PointerPos::new(first.window().x_for(a.span.end), Some(p1.id));
    first.begin_gesture(a.id, GestureKind::ResizeEnd, edge).unwrap();
    first
        .drag_to(PointerPos::new(first.window().x_for(at(10, 30)), Some(p1.id)))
        .unwrap();
    first.release().unwrap();
    first.settle().await;

    until_reloaded(&mut second).await;
    let err = second.release().unwrap_err();
    assert!(matches!(err, EngineError::Conflict { with, .. } if with == a.id));
    assert!(matches!(
        second.drain_notices().as_slice(),
        [Notice::Conflict { span, .. }] if *span == Span::new(at(8, 0), at(10, 30))
    ));
    assert_eq!(store.store().get_assignment(&b.id).unwrap().machine_id, p2.id);
}

#[tokio::test]
async fn lifecycle_changes_reach_the_summary() {
    let store = Arc::new(ScheduleStore::in_memory());
    let p1 = machine("P1");
    store.register_machine(p1.clone()).await.unwrap();
    let mut board = board_for(&store).await;

    let a = assignment(p1.id, Span::new(at(8, 0), at(14, 0)), "WO-7");
    let b = assignment(p1.id, Span::new(at(14, 0), at(15, 30)), "WO-8");
    store.create_assignment(a.clone()).await.unwrap();
    store.create_assignment(b.clone()).await.unwrap();
    store.set_status(a.id, AssignmentStatus::Running).await.unwrap();
    until_reloaded(&mut board).await;

    let summary = board.summary(at(9, 0));
    assert_eq!(summary.next_completion, Some(at(14, 0)));
    assert_eq!(summary.running_quantity, 500);

    store.delete_assignment(a.id).await.unwrap();
    until_reloaded(&mut board).await;
    assert_eq!(board.summary(at(9, 0)).next_completion, None);
    assert_eq!(board.flat_list().len(), 1);
}

#[tokio::test]
async fn journal_keeps_committed_moves_across_restart() {
    let path = journal_path("restart.journal");
    let p1 = machine("P1");
    let a = assignment(p1.id, Span::new(at(8, 0), at(9, 0)), "WO-3");
    {
        let store = Arc::new(ScheduleStore::open(&path).unwrap());
        store.register_machine(p1.clone()).await.unwrap();
        store.create_assignment(a.clone()).await.unwrap();

        let mut board = board_for(&store).await;
        let origin = PointerPos::new(board.window().x_for(a.span.start), Some(p1.id));
        board.begin_gesture(a.id, GestureKind::Move, origin).unwrap();
        board
            .drag_to(PointerPos::new(board.window().x_for(at(11, 15)), Some(p1.id)))
            .unwrap();
        board.release().unwrap();
        assert!(board.settle().await[0].is_confirmed());
        board.close();
    }

    let reopened = ScheduleStore::open(&path).unwrap();
    let listed = reopened
        .list_assignments(&AssignmentFilter::all())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].span, Span::new(at(11, 15), at(12, 15)));
}
