//! Rebuilding the todo hierarchy from a flat list.
//!
//! [`build_forest`] runs in four passes over an arena of slots: filter the
//! roots, index by id, link each slot into its parent's child list, then
//! assemble owned trees bottom-up. No pass recurses, so nesting depth is
//! bounded only by memory.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{Todo, TodoFilter, TodoWithChildren};

impl TodoFilter {
    /// Whether a todo survives the filter. Only roots are ever excluded.
    pub fn keeps(&self, todo: &Todo) -> bool {
        if todo.parent_id.is_some() {
            return true;
        }
        match self {
            Self::All => true,
            Self::Completed => todo.completed,
            Self::Pending => !todo.completed,
        }
    }
}

/// Build the display forest for one user's todos.
///
/// Input order is preserved both among roots and within each child list.
/// A todo whose parent is missing from the (filtered) input is an orphan and
/// does not appear anywhere in the output. Cycles in `parent_id` can never be
/// reached from a root, so they are dropped the same way.
pub fn build_forest(todos: Vec<Todo>, filter: TodoFilter) -> Vec<TodoWithChildren> {
    let kept: Vec<Todo> = todos.into_iter().filter(|todo| filter.keeps(todo)).collect();

    let mut index: HashMap<Uuid, usize> = HashMap::with_capacity(kept.len());
    for (i, todo) in kept.iter().enumerate() {
        index.entry(todo.id).or_insert(i);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); kept.len()];
    let mut roots = Vec::new();
    for (i, todo) in kept.iter().enumerate() {
        match todo.parent_id {
            None => roots.push(i),
            Some(parent_id) => {
                if let Some(&parent) = index.get(&parent_id) {
                    if parent != i {
                        children[parent].push(i);
                    }
                }
            }
        }
    }

    // Preorder from the roots. A slot in a cycle or under a missing parent is
    // never reached.
    let mut order = Vec::with_capacity(kept.len());
    let mut visited = vec![false; kept.len()];
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(slot) = stack.pop() {
        if std::mem::replace(&mut visited[slot], true) {
            continue;
        }
        order.push(slot);
        stack.extend(children[slot].iter().rev());
    }

    // Reverse preorder finishes every child before its parent.
    let mut slots: Vec<Option<Todo>> = kept.into_iter().map(Some).collect();
    let mut built: Vec<Option<TodoWithChildren>> =
        std::iter::repeat_with(|| None).take(slots.len()).collect();
    for &slot in order.iter().rev() {
        let Some(todo) = slots[slot].take() else {
            continue;
        };
        let assembled = children[slot]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[slot] = Some(TodoWithChildren {
            todo,
            children: assembled,
        });
    }

    roots
        .into_iter()
        .filter_map(|root| built[root].take())
        .collect()
}

/// Number of todos in a forest, counting every level.
pub fn count_nodes(forest: &[TodoWithChildren]) -> usize {
    let mut count = 0;
    let mut stack: Vec<&TodoWithChildren> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        count += 1;
        stack.extend(node.children.iter());
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use chrono::Utc;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn todo(n: u128, parent: Option<u128>, completed: bool) -> Todo {
        let now = Utc::now();
        Todo {
            id: id(n),
            user_id: Uuid::nil(),
            parent_id: parent.map(id),
            title: format!("todo {}", n),
            description: None,
            priority: Priority::Medium,
            completed,
            due_date: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn ids(forest: &[TodoWithChildren]) -> Vec<Uuid> {
        forest.iter().map(|node| node.todo.id).collect()
    }

    #[test]
    fn empty_input_gives_empty_forest() {
        assert!(build_forest(Vec::new(), TodoFilter::All).is_empty());
    }

    #[test]
    fn completed_filter_keeps_pending_children_of_completed_roots() {
        let todos = vec![
            todo(1, None, true),
            todo(2, Some(1), false),
            todo(3, None, false),
        ];

        let forest = build_forest(todos, TodoFilter::Completed);

        assert_eq!(ids(&forest), vec![id(1)]);
        assert_eq!(ids(&forest[0].children), vec![id(2)]);
        assert!(forest[0].children[0].children.is_empty());
    }

    #[test]
    fn pending_filter_keeps_completed_children_of_pending_roots() {
        let todos = vec![
            todo(1, None, true),
            todo(2, Some(1), false),
            todo(3, None, false),
            todo(4, Some(3), true),
        ];

        let forest = build_forest(todos, TodoFilter::Pending);

        assert_eq!(ids(&forest), vec![id(3)]);
        assert_eq!(ids(&forest[0].children), vec![id(4)]);
    }

    #[test]
    fn children_of_filtered_out_roots_disappear() {
        let todos = vec![todo(1, None, true), todo(2, Some(1), false)];
        let forest = build_forest(todos, TodoFilter::Pending);
        assert!(forest.is_empty());
    }

    #[test]
    fn preserves_input_order_at_every_level() {
        let todos = vec![
            todo(10, Some(1), false),
            todo(2, None, false),
            todo(1, None, false),
            todo(11, Some(1), false),
            todo(5, Some(1), false),
            todo(20, Some(10), false),
        ];

        let forest = build_forest(todos, TodoFilter::All);

        assert_eq!(ids(&forest), vec![id(2), id(1)]);
        assert_eq!(ids(&forest[1].children), vec![id(10), id(11), id(5)]);
        assert_eq!(ids(&forest[1].children[0].children), vec![id(20)]);
    }

    #[test]
    fn linked_children_appear_exactly_once_and_never_as_roots() {
        let todos = vec![
            todo(1, None, false),
            todo(2, Some(1), false),
            todo(3, Some(2), false),
            todo(4, Some(1), false),
        ];

        let forest = build_forest(todos, TodoFilter::All);

        assert_eq!(ids(&forest), vec![id(1)]);
        assert_eq!(count_nodes(&forest), 4);
    }

    #[test]
    fn orphans_are_dropped_at_every_level() {
        let todos = vec![
            todo(1, None, false),
            todo(2, Some(99), false),
            todo(3, Some(2), false),
        ];

        let forest = build_forest(todos, TodoFilter::All);

        assert_eq!(ids(&forest), vec![id(1)]);
        assert_eq!(count_nodes(&forest), 1);
    }

    #[test]
    fn cycles_terminate_and_are_unreachable() {
        let todos = vec![
            todo(1, None, false),
            todo(2, Some(3), false),
            todo(3, Some(2), false),
            todo(4, Some(4), false),
        ];

        let forest = build_forest(todos, TodoFilter::All);

        assert_eq!(ids(&forest), vec![id(1)]);
        assert_eq!(count_nodes(&forest), 1);
    }

    #[test]
    fn building_twice_gives_identical_forests() {
        let todos = vec![
            todo(3, None, true),
            todo(1, Some(3), false),
            todo(2, None, false),
            todo(4, Some(1), true),
        ];

        let first = build_forest(todos.clone(), TodoFilter::All);
        let second = build_forest(todos, TodoFilter::All);

        assert_eq!(first, second);
    }

    #[test]
    fn completed_filter_keeps_exactly_completed_roots() {
        let todos: Vec<Todo> = (1..=6).map(|n| todo(n, None, n % 2 == 0)).collect();

        let forest = build_forest(todos, TodoFilter::Completed);

        assert_eq!(ids(&forest), vec![id(2), id(4), id(6)]);
    }

    #[test]
    fn filter_keeps_children_regardless_of_status() {
        assert!(TodoFilter::Completed.keeps(&todo(2, Some(1), false)));
        assert!(TodoFilter::Pending.keeps(&todo(2, Some(1), true)));
        assert!(!TodoFilter::Pending.keeps(&todo(1, None, true)));
    }

    #[test]
    fn deep_chain_builds_without_recursion() {
        let depth = 20_000;
        let todos: Vec<Todo> = (1..=depth)
            .map(|n| todo(n, if n == 1 { None } else { Some(n - 1) }, false))
            .collect();

        let forest = build_forest(todos, TodoFilter::All);

        assert_eq!(ids(&forest), vec![id(1)]);
        assert_eq!(count_nodes(&forest), depth as usize);

        let mut node = &forest[0];
        let mut levels = 1;
        while let Some(child) = node.children.first() {
            node = child;
            levels += 1;
        }
        assert_eq!(levels, depth);
        assert_eq!(node.todo.id, id(depth));
    }
}
