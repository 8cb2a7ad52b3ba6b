//! Catalog feature module: product attributes and brands.
//!
//! Every operation is a request dispatched through the [`pipeline::Mediator`].
//! Queries are cached under the keys in [`keys`]; commands invalidate those
//! keys once their unit of work has committed.

pub mod attribute;
pub mod brand;
pub mod keys;

use domain::UnitOfWorkFactory;
use pipeline::MediatorBuilder;

use attribute::{
    CreateAttribute, CreateAttributeHandler, DeleteAttribute, DeleteAttributeHandler,
    GetAttributes, GetAttributesHandler, validate_create_attribute,
};
use brand::{
    CreateBrand, CreateBrandHandler, DeleteBrand, DeleteBrandHandler, GetBrand, GetBrandHandler,
    ListBrands, ListBrandsHandler, UpdateBrand, UpdateBrandHandler, validate_create_brand,
    validate_list_brands, validate_update_brand,
};

/// Registers every catalog handler and validator.
pub fn register(builder: MediatorBuilder, uow: &UnitOfWorkFactory) -> MediatorBuilder {
    builder
        .handler::<GetAttributes, _>(GetAttributesHandler::new(uow.clone()))
        .handler::<CreateAttribute, _>(CreateAttributeHandler::new(uow.clone()))
        .validator::<CreateAttribute, _>(validate_create_attribute)
        .handler::<DeleteAttribute, _>(DeleteAttributeHandler::new(uow.clone()))
        .handler::<GetBrand, _>(GetBrandHandler::new(uow.clone()))
        .handler::<ListBrands, _>(ListBrandsHandler::new(uow.clone()))
        .validator::<ListBrands, _>(validate_list_brands)
        .handler::<CreateBrand, _>(CreateBrandHandler::new(uow.clone()))
        .validator::<CreateBrand, _>(validate_create_brand)
        .handler::<UpdateBrand, _>(UpdateBrandHandler::new(uow.clone()))
        .validator::<UpdateBrand, _>(validate_update_brand)
        .handler::<DeleteBrand, _>(DeleteBrandHandler::new(uow.clone()))
}
