//! ASCII tree rendering for todo forests.

use crate::models::{Priority, Todo, TodoWithChildren};

const DONE: &str = "[x]";
const OPEN: &str = "[ ]";

fn priority_symbol(priority: Priority) -> char {
    match priority {
        Priority::Low => '↓',
        Priority::Medium => '·',
        Priority::High => '!',
    }
}

/// One-line summary of a todo: checkbox, priority, title, due date and tags.
pub fn render_line(todo: &Todo) -> String {
    let mut line = format!(
        "{} {} {}",
        if todo.completed { DONE } else { OPEN },
        priority_symbol(todo.priority),
        todo.title
    );
    if let Some(due) = todo.due_date {
        line.push_str(&format!(" (due {})", due.format("%Y-%m-%d")));
    }
    for tag in &todo.tags {
        line.push_str(" #");
        line.push_str(tag);
    }
    line
}

/// Render a forest as ASCII art.
///
/// Example output:
/// ```text
/// [ ] ! Launch website (due 2024-12-31) #work
/// ├── [x] · Buy domain
/// └── [ ] · Write copy
///     └── [ ] ↓ Proofread
/// [x] · Call plumber
/// ```
pub fn render_tree(nodes: &[TodoWithChildren]) -> String {
    let mut output = String::new();
    for node in nodes {
        output.push_str(&render_line(&node.todo));
        output.push('\n');
        render_children(&mut output, &node.children, "");
    }
    output
}

fn render_children(output: &mut String, children: &[TodoWithChildren], prefix: &str) {
    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        output.push_str(prefix);
        output.push_str(if is_last { "└── " } else { "├── " });
        output.push_str(&render_line(&child.todo));
        output.push('\n');

        let continuation = if is_last { "    " } else { "│   " };
        render_children(output, &child.children, &format!("{}{}", prefix, continuation));
    }
}

/// Render a flat list with short ids, newest first as given.
pub fn render_flat(todos: &[Todo]) -> String {
    todos
        .iter()
        .map(|todo| format!("{}  {}\n", short_id(todo), render_line(todo)))
        .collect()
}

fn short_id(todo: &Todo) -> String {
    todo.id.simple().to_string()[..8].to_string()
}
