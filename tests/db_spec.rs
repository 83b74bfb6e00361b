use chrono::NaiveDate;
use nested_todos::db::{Database, MAX_DEPTH};
use nested_todos::models::*;
use nested_todos::validation::ValidationErrors;
use speculate2::speculate;
use uuid::Uuid;

fn input(title: &str) -> CreateTodoInput {
    CreateTodoInput {
        parent_id: None,
        title: title.to_string(),
        description: None,
        priority: Priority::Medium,
        due_date: None,
        tags: Vec::new(),
        completed: None,
    }
}

fn child_input(title: &str, parent_id: Uuid) -> CreateTodoInput {
    CreateTodoInput {
        parent_id: Some(parent_id),
        ..input(title)
    }
}

/// A root followed by `len` nested descendants. Returns the deepest todo.
fn chain(db: &Database, user_id: Uuid, len: usize) -> Todo {
    let mut last = db.create_todo(user_id, input("level 0")).expect("Failed to create");
    for level in 1..=len {
        last = db
            .create_todo(user_id, child_input(&format!("level {}", level), last.id))
            .expect("Failed to create");
    }
    last
}

fn update_of(todo: &Todo) -> UpdateTodoInput {
    UpdateTodoInput {
        id: todo.id,
        fields: CreateTodoInput {
            parent_id: todo.parent_id,
            title: todo.title.clone(),
            description: todo.description.clone(),
            priority: todo.priority,
            due_date: todo.due_date,
            tags: todo.tags.clone(),
            completed: None,
        },
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
    }

    describe "create_todo" {
        it "creates a pending todo with required fields" {
            let todo = db.create_todo(alice, input("Buy milk")).expect("Failed to create todo");

            assert_eq!(todo.title, "Buy milk");
            assert_eq!(todo.user_id, alice);
            assert_eq!(todo.priority, Priority::Medium);
            assert!(!todo.completed);
            assert!(todo.parent_id.is_none());
            assert_eq!(todo.created_at, todo.updated_at);
        }

        it "stores every field" {
            let todo = db.create_todo(alice, CreateTodoInput {
                parent_id: None,
                title: "Taxes".to_string(),
                description: Some("file early".to_string()),
                priority: Priority::High,
                due_date: NaiveDate::from_ymd_opt(2024, 4, 15),
                tags: vec!["money".to_string(), "home".to_string(), "money".to_string()],
                completed: Some(true),
            }).expect("Failed to create todo");

            let found = db.get_todo(alice, todo.id).expect("Query failed").expect("Todo missing");
            assert_eq!(found, todo);
            assert!(found.completed);
            assert_eq!(found.tags, vec!["money", "home", "money"]);
        }
    }

    describe "get_todo" {
        it "returns None for a non-existent todo" {
            let result = db.get_todo(alice, Uuid::new_v4()).expect("Query failed");
            assert!(result.is_none());
        }

        it "does not return another user's todo" {
            let todo = db.create_todo(alice, input("Private")).expect("Failed to create");
            let result = db.get_todo(bob, todo.id).expect("Query failed");
            assert!(result.is_none());
        }
    }

    describe "list_todos" {
        it "returns an empty list when the user has no todos" {
            assert!(db.list_todos(alice).expect("Query failed").is_empty());
        }

        it "returns the user's todos newest first" {
            db.create_todo(alice, input("First")).expect("Failed to create");
            db.create_todo(alice, input("Second")).expect("Failed to create");
            db.create_todo(alice, input("Third")).expect("Failed to create");
            db.create_todo(bob, input("Bob's")).expect("Failed to create");

            let titles: Vec<_> = db.list_todos(alice).expect("Query failed")
                .into_iter().map(|t| t.title).collect();
            assert_eq!(titles, vec!["Third", "Second", "First"]);
        }
    }

    describe "update_todo" {
        it "replaces the editable fields and keeps completion" {
            let todo = db.create_todo(alice, CreateTodoInput {
                completed: Some(true),
                ..input("Old")
            }).expect("Failed to create");

            let mut update = update_of(&todo);
            update.fields.title = "New".to_string();
            update.fields.priority = Priority::Low;
            update.fields.tags = vec!["x".to_string()];

            let updated = db.update_todo(alice, update).expect("Update failed").expect("Todo missing");

            assert_eq!(updated.title, "New");
            assert_eq!(updated.priority, Priority::Low);
            assert_eq!(updated.tags, vec!["x"]);
            assert!(updated.completed);
            assert_eq!(updated.created_at, todo.created_at);
            assert!(updated.updated_at >= todo.updated_at);
            assert_eq!(db.get_todo(alice, todo.id).expect("Query failed"), Some(updated));
        }

        it "returns None for another user's todo and leaves it unchanged" {
            let todo = db.create_todo(alice, input("Mine")).expect("Failed to create");
            let mut update = update_of(&todo);
            update.fields.title = "Hijacked".to_string();

            assert!(db.update_todo(bob, update).expect("Update failed").is_none());
            let found = db.get_todo(alice, todo.id).expect("Query failed").expect("Todo missing");
            assert_eq!(found.title, "Mine");
        }

        it "moves a todo under a new parent" {
            let a = db.create_todo(alice, input("A")).expect("Failed to create");
            let b = db.create_todo(alice, input("B")).expect("Failed to create");

            let mut update = update_of(&b);
            update.fields.parent_id = Some(a.id);
            let moved = db.update_todo(alice, update).expect("Update failed").expect("Todo missing");

            assert_eq!(moved.parent_id, Some(a.id));
        }

        it "rejects making a todo its own parent" {
            let todo = db.create_todo(alice, input("Loop")).expect("Failed to create");
            let mut update = update_of(&todo);
            update.fields.parent_id = Some(todo.id);

            let err = db.update_todo(alice, update).expect_err("Cycle accepted");
            let errors = err.downcast_ref::<ValidationErrors>().expect("Not a validation error");
            assert!(errors.has_field("parent_id"));
        }

        it "rejects moving a todo under its own descendant" {
            let root = db.create_todo(alice, input("Root")).expect("Failed to create");
            let child = db.create_todo(alice, child_input("Child", root.id)).expect("Failed to create");
            let grandchild = db.create_todo(alice, child_input("Grandchild", child.id)).expect("Failed to create");

            let mut update = update_of(&root);
            update.fields.parent_id = Some(grandchild.id);

            let err = db.update_todo(alice, update).expect_err("Cycle accepted");
            assert!(err.downcast_ref::<ValidationErrors>().is_some());
            let stored = db.get_todo(alice, root.id).expect("Query failed").expect("Todo missing");
            assert!(stored.parent_id.is_none());
        }

        it "allows a parent that does not exist" {
            let todo = db.create_todo(alice, input("Dangling")).expect("Failed to create");
            let mut update = update_of(&todo);
            update.fields.parent_id = Some(Uuid::new_v4());

            assert!(db.update_todo(alice, update).expect("Update failed").is_some());
        }
    }

    describe "nesting depth" {
        it "allows todos down to the maximum depth" {
            let deepest = chain(&db, alice, MAX_DEPTH);

            let forest = db.get_forest(alice, TodoFilter::All).expect("Query failed");
            assert_eq!(nested_todos::forest::count_nodes(&forest), MAX_DEPTH + 1);
            assert_eq!(deepest.title, format!("level {}", MAX_DEPTH));
        }

        it "rejects creating a todo below the maximum depth" {
            let deepest = chain(&db, alice, MAX_DEPTH);

            let err = db.create_todo(alice, child_input("too deep", deepest.id)).expect_err("Depth accepted");
            let errors = err.downcast_ref::<ValidationErrors>().expect("Not a validation error");
            assert!(errors.has_field("parent_id"));
            assert_eq!(db.list_todos(alice).expect("Query failed").len(), MAX_DEPTH + 1);
        }

        it "rejects moving a subtree where its leaves would end up too deep" {
            let deepest = chain(&db, alice, MAX_DEPTH - 1);
            let subtree = db.create_todo(alice, input("subtree")).expect("Failed to create");
            db.create_todo(alice, child_input("leaf", subtree.id)).expect("Failed to create");

            let mut update = update_of(&subtree);
            update.fields.parent_id = Some(deepest.id);

            let err = db.update_todo(alice, update).expect_err("Depth accepted");
            assert!(err.downcast_ref::<ValidationErrors>().is_some());
            let stored = db.get_todo(alice, subtree.id).expect("Query failed").expect("Todo missing");
            assert!(stored.parent_id.is_none());
        }

        it "allows moving a leaf to the maximum depth" {
            let deepest = chain(&db, alice, MAX_DEPTH - 1);
            let leaf = db.create_todo(alice, input("leaf")).expect("Failed to create");

            let mut update = update_of(&leaf);
            update.fields.parent_id = Some(deepest.id);

            assert!(db.update_todo(alice, update).expect("Update failed").is_some());
        }
    }

    describe "toggle_todo" {
        it "sets the completion flag both ways" {
            let todo = db.create_todo(alice, input("Toggle me")).expect("Failed to create");

            assert!(db.toggle_todo(alice, todo.id, true).expect("Toggle failed"));
            assert!(db.get_todo(alice, todo.id).expect("Query failed").expect("Todo missing").completed);

            assert!(db.toggle_todo(alice, todo.id, false).expect("Toggle failed"));
            assert!(!db.get_todo(alice, todo.id).expect("Query failed").expect("Todo missing").completed);
        }

        it "returns false for another user's todo" {
            let todo = db.create_todo(alice, input("Mine")).expect("Failed to create");

            assert!(!db.toggle_todo(bob, todo.id, true).expect("Toggle failed"));
            assert!(!db.get_todo(alice, todo.id).expect("Query failed").expect("Todo missing").completed);
        }
    }

    describe "delete_todo" {
        it "deletes the todo" {
            let todo = db.create_todo(alice, input("Bye")).expect("Failed to create");

            assert!(db.delete_todo(alice, todo.id).expect("Delete failed"));
            assert!(db.get_todo(alice, todo.id).expect("Query failed").is_none());
            assert!(!db.delete_todo(alice, todo.id).expect("Delete failed"));
        }

        it "does not delete another user's todo" {
            let todo = db.create_todo(alice, input("Mine")).expect("Failed to create");

            assert!(!db.delete_todo(bob, todo.id).expect("Delete failed"));
            assert!(db.get_todo(alice, todo.id).expect("Query failed").is_some());
        }

        it "leaves children in place as orphans" {
            let parent = db.create_todo(alice, input("Parent")).expect("Failed to create");
            let child = db.create_todo(alice, child_input("Child", parent.id)).expect("Failed to create");

            db.delete_todo(alice, parent.id).expect("Delete failed");

            assert!(db.get_todo(alice, child.id).expect("Query failed").is_some());
            assert!(db.get_forest(alice, TodoFilter::All).expect("Query failed").is_empty());
        }
    }

    describe "get_forest" {
        it "nests children under their parents" {
            let root = db.create_todo(alice, input("Root")).expect("Failed to create");
            let first = db.create_todo(alice, child_input("First child", root.id)).expect("Failed to create");
            let second = db.create_todo(alice, child_input("Second child", root.id)).expect("Failed to create");
            db.create_todo(alice, input("Other root")).expect("Failed to create");

            let forest = db.get_forest(alice, TodoFilter::All).expect("Query failed");

            let roots: Vec<_> = forest.iter().map(|n| n.todo.title.as_str()).collect();
            assert_eq!(roots, vec!["Other root", "Root"]);
            let children: Vec<_> = forest[1].children.iter().map(|n| n.todo.id).collect();
            assert_eq!(children, vec![second.id, first.id]);
        }

        it "filters roots by completion and keeps their children" {
            let done = db.create_todo(alice, CreateTodoInput {
                completed: Some(true),
                ..input("Done root")
            }).expect("Failed to create");
            db.create_todo(alice, child_input("Pending child", done.id)).expect("Failed to create");
            db.create_todo(alice, input("Pending root")).expect("Failed to create");

            let completed = db.get_forest(alice, TodoFilter::Completed).expect("Query failed");
            assert_eq!(completed.len(), 1);
            assert_eq!(completed[0].todo.title, "Done root");
            assert_eq!(completed[0].children.len(), 1);

            let pending = db.get_forest(alice, TodoFilter::Pending).expect("Query failed");
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].todo.title, "Pending root");
        }

        it "treats another user's parent as missing" {
            let bobs = db.create_todo(bob, input("Bob's root")).expect("Failed to create");
            db.create_todo(alice, child_input("Alice's child", bobs.id)).expect("Failed to create");

            assert!(db.get_forest(alice, TodoFilter::All).expect("Query failed").is_empty());
            assert_eq!(db.get_forest(bob, TodoFilter::All).expect("Query failed")[0].children.len(), 0);
        }
    }

    describe "open" {
        it "persists todos to a file across connections" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("data").join("todos.db");

            let file_db = Database::open(path.clone()).expect("Failed to open");
            file_db.migrate().expect("Failed to migrate");
            let todo = file_db.create_todo(alice, input("Durable")).expect("Failed to create");
            drop(file_db);

            let reopened = Database::open(path).expect("Failed to reopen");
            reopened.migrate().expect("Failed to migrate");
            assert_eq!(reopened.get_todo(alice, todo.id).expect("Query failed"), Some(todo));
        }
    }
}
