pub mod books;

use bookwish_kernel::ModuleRegistry;

use books::routes::BooksState;

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, books: BooksState) {
    registry.register(books::create_module(books));
}
