pub mod auxdata;
pub mod info;
pub mod model;
pub mod namespace;

pub use auxdata::{AuxData, AuxKey};
pub use info::{
    Arg, ConstValue, EnumBuilder, EnumValue, Field, FunctionSig, InterfaceDef, Method, Storage,
    TypeId, TypeInfo, TypeKind,
};
pub use model::{Builtins, ModelBuilder, TypeModel, IMPLICIT_BASE_NAME, IMPLICIT_BASE_NAMESPACE};
pub use namespace::{Namespace, NamespaceMember};
