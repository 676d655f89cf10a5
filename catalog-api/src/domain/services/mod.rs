pub mod banner_service;
pub mod product_mutation_service;
pub mod product_query_service;
pub mod slug;
