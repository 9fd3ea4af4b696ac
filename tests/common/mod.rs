//! Shared helpers for the integration tests.
//!
//! Symbol tables are process-wide, so every test builds its classes under
//! its own package prefix.

#![allow(dead_code)]

pub mod interp;

use dexopt::dex::{
    ClassCreator, DexAccessFlags, DexClass, DexMethod, DexMethodRef, DexStore, DexStoresVector, DexType,
};
use dexopt::ir::method_from_string;

/// A class with the given superclass and methods, in assembler syntax.
pub fn class(name: &str, sup: Option<&str>, access: DexAccessFlags, methods: &[String]) -> DexClass {
    let mut creator = ClassCreator::new(DexType::make(name)).set_access(access);
    if let Some(s) = sup {
        creator = creator.set_super(DexType::make(s));
    }
    for m in methods {
        creator = creator.add_method(method_from_string(m).unwrap());
    }
    creator.create().unwrap()
}

pub fn stores(classes: Vec<DexClass>) -> DexStoresVector {
    let mut store = DexStore::new("classes");
    store.add_classes(classes);
    vec![store]
}

pub fn def(desc: &str) -> DexMethod {
    DexMethodRef::make_from_descriptor(desc)
        .unwrap()
        .as_def()
        .unwrap()
}

pub fn ctor(cls: &str, sup: Option<&str>) -> String {
    match sup {
        Some(s) => format!(
            "(method (public constructor) \"{}.<init>:()V\" ((load-param-object v0) (invoke-direct (v0) \"{}.<init>:()V\") (return-void)))",
            cls, s
        ),
        None => format!(
            "(method (public constructor) \"{}.<init>:()V\" ((load-param-object v0) (return-void)))",
            cls
        ),
    }
}

pub fn concrete_foo(cls: &str) -> String {
    format!("(method (public) \"{}.foo:()V\" ((load-param-object v0) (return-void)))", cls)
}

pub fn abstract_foo(cls: &str) -> String {
    format!("(method (public abstract) \"{}.foo:()V\")", cls)
}

/// A `Main` class whose static root `run` creates `created` and calls
/// `foo` through a receiver of static type `called`.
pub fn main_creating(pkg: &str, created: &str, called: &str) -> DexClass {
    let run = format!(
        r#"(method (public static) "L{pkg}/Main;.run:()V" (
          (new-instance "{created}")
          (move-result-pseudo-object v0)
          (invoke-direct (v0) "{created}.<init>:()V")
          (invoke-virtual (v0) "{called}.foo:()V")
          (return-void)
        ))"#
    );
    let main = class(
        &format!("L{}/Main;", pkg),
        None,
        dexopt::dex::ACC_PUBLIC,
        &[run],
    );
    def(&format!("L{}/Main;.run:()V", pkg)).rstate().set_root();
    main
}

/// Descriptors of `classes` with the package prefix removed.
pub fn short_names(classes: &[DexClass], pkg: &str) -> Vec<String> {
    let prefix = format!("L{}/", pkg);
    classes
        .iter()
        .map(|c| c.get_type().as_str().trim_start_matches(prefix.as_str()).to_string())
        .collect()
}
