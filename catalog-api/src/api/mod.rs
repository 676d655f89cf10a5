pub mod banners;
pub mod categories;
mod multipart;
pub mod products;
