mod property_detail;
mod property_form;
mod property_list;

pub use property_detail::PropertyDetailView;
pub use property_form::PropertyFormView;
pub use property_list::PropertyListView;
