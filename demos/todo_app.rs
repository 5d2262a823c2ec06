//! Demonstration of a typed store for managing complex state

use statekit::{Merge, Store};

#[derive(Clone, Debug)]
struct TodoItem {
    id: usize,
    title: String,
    completed: bool,
}

#[derive(Clone, Debug, PartialEq)]
enum TodoFilter {
    All,
    Active,
    Completed,
}

#[derive(Clone, Debug)]
struct AppState {
    todos: Vec<TodoItem>,
    filter: TodoFilter,
}

#[derive(Default)]
struct AppPatch {
    todos: Option<Vec<TodoItem>>,
    filter: Option<TodoFilter>,
}

impl Merge for AppState {
    type Patch = AppPatch;

    fn merge(&mut self, patch: AppPatch) {
        if let Some(todos) = patch.todos {
            self.todos = todos;
        }
        if let Some(filter) = patch.filter {
            self.filter = filter;
        }
    }
}

impl AppState {
    fn new() -> Self {
        Self {
            todos: Vec::new(),
            filter: TodoFilter::All,
        }
    }

    fn filtered_todos(&self) -> Vec<&TodoItem> {
        match self.filter {
            TodoFilter::All => self.todos.iter().collect(),
            TodoFilter::Active => self.todos.iter().filter(|t| !t.completed).collect(),
            TodoFilter::Completed => self.todos.iter().filter(|t| t.completed).collect(),
        }
    }

    fn stats(&self) -> (usize, usize, usize) {
        let total = self.todos.len();
        let completed = self.todos.iter().filter(|t| t.completed).count();
        let active = total - completed;
        (total, active, completed)
    }
}

fn add_todo(title: &str) -> impl FnOnce(&AppState) -> AppPatch + 'static {
    let title = title.to_string();
    move |state| {
        let mut todos = state.todos.clone();
        todos.push(TodoItem {
            id: todos.len(),
            title,
            completed: false,
        });
        AppPatch {
            todos: Some(todos),
            ..Default::default()
        }
    }
}

fn toggle_todo(id: usize) -> impl FnOnce(&AppState) -> AppPatch + 'static {
    move |state| {
        let mut todos = state.todos.clone();
        if let Some(todo) = todos.iter_mut().find(|t| t.id == id) {
            todo.completed = !todo.completed;
        }
        AppPatch {
            todos: Some(todos),
            ..Default::default()
        }
    }
}

fn show_filter(filter: TodoFilter) -> AppPatch {
    AppPatch {
        filter: Some(filter),
        ..Default::default()
    }
}

fn main() {
    println!("=== Store Example: Todo App ===\n");

    let store = Store::new(AppState::new());

    println!("1. Setting up subscriber");
    let probe = store.clone();
    let _subscription = store.subscribe(move || {
        let (total, active, completed) = probe.read(AppState::stats);
        println!(
            "   [Store Update] Total: {}, Active: {}, Completed: {}",
            total, active, completed
        );
    });

    println!("\n2. Adding todos");
    store.update(add_todo("Learn Rust"));
    store.update(add_todo("Build reactive library"));
    store.update(add_todo("Write documentation"));

    println!("\n3. Completing the first two todos");
    store.update(toggle_todo(0));
    store.update(toggle_todo(1));

    println!("\n4. Active todos:");
    store.set(show_filter(TodoFilter::Active));
    store.read(|state| {
        for todo in state.filtered_todos() {
            println!("   [ ] {}", todo.title);
        }
    });

    println!("\n5. Completed todos:");
    store.set(show_filter(TodoFilter::Completed));
    store.read(|state| {
        for todo in state.filtered_todos() {
            println!("   [✓] {}", todo.title);
        }
    });

    println!("\n6. Resetting");
    store.reset();
    let (total, _, _) = store.read(AppState::stats);
    println!("   Total after reset: {}", total);

    println!("\n✓ Example complete!");
}
