//! Brands and their detail and list views.

mod aggregate;
mod events;
mod handlers;
mod requests;

pub use aggregate::Brand;
pub use events::{BrandEvent, BrandRegisteredData, BrandRenamedData, BrandWebsiteChangedData};
pub use handlers::{
    CreateBrandHandler, DeleteBrandHandler, GetBrandHandler, ListBrandsHandler, UpdateBrandHandler,
};
pub use requests::{
    BrandPage, BrandView, CreateBrand, DeleteBrand, GetBrand, ListBrands, UpdateBrand,
    validate_create_brand, validate_list_brands, validate_update_brand,
};
