//! Integration tests for replication and reconciliation.
//!
//! Covers convergence under interleaved delivery, idempotent
//! re-delivery, stale-write rejection, tombstone anti-resurrection,
//! full-sync overwrite, and the no-relay-amplification property on a
//! three-peer loopback mesh.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use taskmesh::engine::Engine;
use taskmesh::mesh::loopback::{DEFAULT_INBOX_CAPACITY, LoopbackHub, LoopbackMesh};
use taskmesh::mesh::{Mesh, MeshEvent, PeerId};
use taskmesh::net::{self, NodeCommand, NodeConfig, NodeEvent};
use taskmesh_proto::codec;
use taskmesh_proto::message::Message;
use taskmesh_proto::task::{Task, TaskId, TaskStatus};
use taskmesh_proto::topic::Topic;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn make_mesh(hub: &Arc<LoopbackHub>, name: &str) -> LoopbackMesh {
    LoopbackMesh::new(hub, PeerId::new(name), DEFAULT_INBOX_CAPACITY)
}

fn make_task(name: &str, ts: u64) -> Task {
    Task::new(name, "", ts).unwrap()
}

/// Applies every message, in order, to a fresh engine and returns its
/// final task list.
fn replay(messages: &[Message]) -> Vec<Task> {
    let mut engine = Engine::new();
    for msg in messages {
        let _ = engine.apply_remote(msg);
    }
    engine.tasks()
}

/// Drains a mesh until quiescent, applying each protocol message to the
/// engine and broadcasting any reply it asks for. Returns the number
/// of data payloads observed.
async fn pump(mesh: &LoopbackMesh, engine: &mut Engine) -> usize {
    let mut seen = 0;
    while let Ok(Some(event)) = timeout(Duration::from_millis(100), mesh.next_event()).await {
        if let MeshEvent::Data { payload, .. } = event {
            seen += 1;
            if let Ok(msg) = codec::decode(&payload)
                && let Some(reply) = engine.apply_remote(&msg)
            {
                mesh.broadcast(&codec::encode(&reply).unwrap()).await;
            }
        }
    }
    seen
}

/// Waits for a `TasksChanged` event satisfying the predicate.
async fn wait_for_tasks(
    evt_rx: &mut tokio::sync::mpsc::Receiver<NodeEvent>,
    predicate: impl Fn(&[Task]) -> bool,
) -> Vec<Task> {
    let deadline = Duration::from_secs(2);
    loop {
        let event = timeout(deadline, evt_rx.recv())
            .await
            .expect("timed out waiting for task change")
            .expect("event channel closed");
        if let NodeEvent::TasksChanged(tasks) = event
            && predicate(&tasks)
        {
            return tasks;
        }
    }
}

// ---------------------------------------------------------------------------
// Convergence over raw engines
// ---------------------------------------------------------------------------

#[test]
fn peers_converge_under_interleaved_delivery() {
    // Three operations from two origins, delivered in different orders
    // (each consistent with per-origin FIFO) to three receivers.
    let groceries = make_task("buy groceries", 1_000);
    let dishes = make_task("wash dishes", 1_100);

    let add_groceries = Message::Add {
        task: groceries.clone(),
    };
    let add_dishes = Message::Add {
        task: dishes.clone(),
    };
    let move_groceries = Message::Move {
        id: groceries.id.clone(),
        status: TaskStatus::InProgress,
        updated_at: 2_000,
    };
    let delete_dishes = Message::Delete {
        id: dishes.id.clone(),
    };

    let order_a = [
        add_groceries.clone(),
        add_dishes.clone(),
        move_groceries.clone(),
        delete_dishes.clone(),
    ];
    let order_b = [
        add_dishes.clone(),
        delete_dishes.clone(),
        add_groceries.clone(),
        move_groceries.clone(),
    ];
    let order_c = [
        add_groceries.clone(),
        move_groceries.clone(),
        add_dishes.clone(),
        delete_dishes.clone(),
    ];

    let final_a = replay(&order_a);
    let final_b = replay(&order_b);
    let final_c = replay(&order_c);

    assert_eq!(final_a, final_b);
    assert_eq!(final_b, final_c);
    assert_eq!(final_a.len(), 1);
    assert_eq!(final_a[0].id, groceries.id);
    assert_eq!(final_a[0].status, TaskStatus::InProgress);
}

#[test]
fn duplicate_delivery_is_idempotent() {
    let task = make_task("once is enough", 1_000);
    let add = Message::Add { task: task.clone() };
    let delete = Message::Delete {
        id: task.id.clone(),
    };

    let once = replay(&[add.clone(), delete.clone()]);
    let twice = replay(&[add.clone(), add.clone(), delete.clone(), delete.clone()]);
    assert_eq!(once, twice);
    assert!(twice.is_empty());

    let single_add = replay(&[add.clone()]);
    let double_add = replay(&[add.clone(), add]);
    assert_eq!(single_add, double_add);
    assert_eq!(double_add.len(), 1);
}

#[test]
fn remote_edit_preserves_id_and_created_at() {
    let mut engine = Engine::new();
    let original = make_task("draft", 1_000);
    let _ = engine.apply_remote(&Message::Add {
        task: original.clone(),
    });

    let mut edit = original.clone();
    edit.name = "final".to_string();
    edit.updated_at = 2_000;
    let _ = engine.apply_remote(&Message::Add { task: edit });

    let stored = engine.get(&original.id).unwrap();
    assert_eq!(stored.name, "final");
    assert_eq!(stored.id, original.id);
    assert_eq!(stored.created_at, 1_000);
}

#[test]
fn stale_edit_loses_to_newer_write() {
    let mut engine = Engine::new();
    let mut task = make_task("current name", 1_000);
    task.updated_at = 3_000;
    let _ = engine.apply_remote(&Message::Add { task: task.clone() });

    let mut stale = task.clone();
    stale.name = "old name".to_string();
    stale.updated_at = 2_000;
    let _ = engine.apply_remote(&Message::Add { task: stale });

    assert_eq!(engine.get(&task.id).unwrap().name, "current name");
}

#[test]
fn stale_add_after_delete_does_not_resurrect() {
    let task = make_task("deleted for good", 1_000);
    let add = Message::Add { task: task.clone() };
    let delete = Message::Delete {
        id: task.id.clone(),
    };

    // Receiver One sees add then delete; Receiver Two sees the add
    // again after the delete (a slow third peer re-delivering).
    let one = replay(&[add.clone(), delete.clone()]);
    let two = replay(&[add.clone(), delete.clone(), add.clone()]);
    // And Receiver Three sees the delete before the add entirely.
    let three = replay(&[delete, add]);

    assert!(one.is_empty());
    assert_eq!(one, two);
    assert_eq!(two, three);
}

#[test]
fn opposite_toggle_delivery_orders_converge() {
    // Two flips of the same task land at different receivers in
    // opposite orders; both must settle on the newest write.
    let task = make_task("flipped concurrently", 1_000);
    let add = Message::Add { task: task.clone() };
    let done = Message::Toggle {
        id: task.id.clone(),
        status: TaskStatus::Done,
        updated_at: 2_000,
    };
    let back = Message::Toggle {
        id: task.id.clone(),
        status: TaskStatus::Todo,
        updated_at: 2_001,
    };

    let forward = replay(&[add.clone(), done.clone(), back.clone()]);
    let reversed = replay(&[add, back, done]);

    assert_eq!(forward, reversed);
    assert_eq!(forward[0].status, TaskStatus::Todo);
}

#[test]
fn full_sync_overwrites_rather_than_merges() {
    let a = make_task("a", 1_000);
    let b = make_task("b", 1_100);
    let c = make_task("c", 1_200);

    let mut engine = Engine::new();
    let _ = engine.apply_remote(&Message::Sync {
        tasks: vec![a, b],
    });
    assert_eq!(engine.len(), 2);

    let _ = engine.apply_remote(&Message::Sync {
        tasks: vec![c.clone()],
    });
    let tasks = engine.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, c.id);
}

// ---------------------------------------------------------------------------
// Three-peer mesh harness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operations_are_seen_exactly_once_per_peer() {
    let hub = Arc::new(LoopbackHub::new());
    let mesh_a = make_mesh(&hub, "a");
    let mesh_b = make_mesh(&hub, "b");
    let mesh_c = make_mesh(&hub, "c");
    let topic = Topic::from_bytes([7; 32]);

    mesh_a.join(topic).await.unwrap();
    mesh_b.join(topic).await.unwrap();
    mesh_c.join(topic).await.unwrap();

    let mut engine_a = Engine::new();
    let mut engine_b = Engine::new();
    let mut engine_c = Engine::new();

    // One local add at A, announced once.
    let (_, add) = engine_a.create_task("replicated exactly once", "").unwrap();
    mesh_a.broadcast(&codec::encode(&add).unwrap()).await;

    // Pump everyone to quiescence, twice, so any mistaken relay would
    // have a chance to circulate and be counted.
    let seen_b = pump(&mesh_b, &mut engine_b).await;
    let seen_c = pump(&mesh_c, &mut engine_c).await;
    let seen_a = pump(&mesh_a, &mut engine_a).await;
    assert_eq!(seen_b, 1);
    assert_eq!(seen_c, 1);
    assert_eq!(seen_a, 0);

    assert_eq!(pump(&mesh_b, &mut engine_b).await, 0);
    assert_eq!(pump(&mesh_c, &mut engine_c).await, 0);
    assert_eq!(pump(&mesh_a, &mut engine_a).await, 0);

    assert_eq!(engine_a.tasks(), engine_b.tasks());
    assert_eq!(engine_b.tasks(), engine_c.tasks());
}

#[tokio::test]
async fn spawned_nodes_replicate_adds_and_deletes() {
    let hub = Arc::new(LoopbackHub::new());
    let mesh_a = make_mesh(&hub, "a");
    let mesh_b = make_mesh(&hub, "b");
    let topic = Topic::from_bytes([9; 32]);

    mesh_a.join(topic).await.unwrap();
    mesh_b.join(topic).await.unwrap();

    let config = NodeConfig::default();
    let (cmd_a, mut evt_a) = net::spawn_node(mesh_a, &config);
    let (_cmd_b, mut evt_b) = net::spawn_node(mesh_b, &config);

    cmd_a
        .send(NodeCommand::AddTask {
            name: "shared chore".to_string(),
            description: "visible everywhere".to_string(),
        })
        .await
        .unwrap();

    let tasks_a = wait_for_tasks(&mut evt_a, |tasks| !tasks.is_empty()).await;
    let tasks_b = wait_for_tasks(&mut evt_b, |tasks| !tasks.is_empty()).await;
    assert_eq!(tasks_a, tasks_b);
    assert_eq!(tasks_b[0].name, "shared chore");

    cmd_a
        .send(NodeCommand::DeleteTask {
            id: tasks_a[0].id.clone(),
        })
        .await
        .unwrap();

    wait_for_tasks(&mut evt_a, |tasks| tasks.is_empty()).await;
    wait_for_tasks(&mut evt_b, |tasks| tasks.is_empty()).await;
}

#[tokio::test]
async fn status_moves_propagate_between_nodes() {
    let hub = Arc::new(LoopbackHub::new());
    let mesh_a = make_mesh(&hub, "a");
    let mesh_b = make_mesh(&hub, "b");
    let topic = Topic::from_bytes([11; 32]);

    mesh_a.join(topic).await.unwrap();
    mesh_b.join(topic).await.unwrap();

    let config = NodeConfig::default();
    let (cmd_a, mut evt_a) = net::spawn_node(mesh_a, &config);
    let (_cmd_b, mut evt_b) = net::spawn_node(mesh_b, &config);

    cmd_a
        .send(NodeCommand::AddTask {
            name: "movable".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    let tasks = wait_for_tasks(&mut evt_b, |tasks| !tasks.is_empty()).await;

    cmd_a
        .send(NodeCommand::SetStatus {
            id: tasks[0].id.clone(),
            status: TaskStatus::InProgress,
        })
        .await
        .unwrap();
    wait_for_tasks(&mut evt_a, |tasks| {
        tasks.first().is_some_and(|t| t.status == TaskStatus::InProgress)
    })
    .await;
    wait_for_tasks(&mut evt_b, |tasks| {
        tasks.first().is_some_and(|t| t.status == TaskStatus::InProgress)
    })
    .await;
}

#[tokio::test]
async fn invalid_add_surfaces_error_and_replicates_nothing() {
    let hub = Arc::new(LoopbackHub::new());
    let mesh_a = make_mesh(&hub, "a");
    let mesh_b = make_mesh(&hub, "b");
    let topic = Topic::from_bytes([13; 32]);

    mesh_a.join(topic).await.unwrap();
    mesh_b.join(topic).await.unwrap();

    let config = NodeConfig::default();
    let (cmd_a, mut evt_a) = net::spawn_node(mesh_a, &config);

    cmd_a
        .send(NodeCommand::AddTask {
            name: String::new(),
            description: "nameless".to_string(),
        })
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(2), evt_a.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert!(matches!(event, NodeEvent::Error(_)));

    // Nothing was broadcast for the invalid add.
    let mut engine_b = Engine::new();
    assert_eq!(pump(&mesh_b, &mut engine_b).await, 0);
}

#[tokio::test]
async fn toggle_round_trips_across_the_mesh() {
    let hub = Arc::new(LoopbackHub::new());
    let mesh_a = make_mesh(&hub, "a");
    let mesh_b = make_mesh(&hub, "b");
    let topic = Topic::from_bytes([17; 32]);

    mesh_a.join(topic).await.unwrap();
    mesh_b.join(topic).await.unwrap();

    let config = NodeConfig::default();
    let (cmd_a, mut evt_a) = net::spawn_node(mesh_a, &config);
    let (_cmd_b, mut evt_b) = net::spawn_node(mesh_b, &config);

    cmd_a
        .send(NodeCommand::AddTask {
            name: "flip me".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    let tasks = wait_for_tasks(&mut evt_a, |tasks| !tasks.is_empty()).await;

    cmd_a
        .send(NodeCommand::Toggle {
            id: tasks[0].id.clone(),
        })
        .await
        .unwrap();
    wait_for_tasks(&mut evt_b, |tasks| {
        tasks.first().is_some_and(|t| t.status == TaskStatus::Done)
    })
    .await;
}

#[test]
fn unknown_id_operations_are_noops() {
    let mut engine = Engine::new();
    let _ = engine.apply_remote(&Message::Delete { id: TaskId::new() });
    let _ = engine.apply_remote(&Message::Move {
        id: TaskId::new(),
        status: TaskStatus::Done,
        updated_at: u64::MAX,
    });
    let _ = engine.apply_remote(&Message::Toggle {
        id: TaskId::new(),
        status: TaskStatus::Done,
        updated_at: u64::MAX,
    });
    assert!(engine.is_empty());
}
