//! Tests for the symbol tables and class model.

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use crate::dex::hierarchy::{is_subclass, super_chain};
    use crate::dex::*;

    #[test]
    fn test_string_interning_identity() {
        let a = DexString::make("dex/tests/hello");
        let b = DexString::make("dex/tests/hello");
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_eq!(DexString::get("dex/tests/hello"), Some(a));
        assert_eq!(DexString::get("dex/tests/never-made"), None);
        assert_eq!(a.as_str(), "dex/tests/hello");
    }

    #[test]
    fn test_concurrent_make_returns_one_pointer() {
        let names: Arc<Vec<String>> =
            Arc::new((0..64).map(|i| format!("Ldex/tests/conc/C{};", i)).collect());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let names = Arc::clone(&names);
                thread::spawn(move || names.iter().map(|n| DexType::make(n)).collect::<Vec<_>>())
            })
            .collect();
        let results: Vec<Vec<DexType>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        for (name, ty) in names.iter().zip(&results[0]) {
            assert_eq!(DexType::get(name), Some(*ty));
        }
    }

    #[test]
    fn test_ordering_follows_spelling() {
        let b = DexType::make("Ldex/tests/order/B;");
        let a = DexType::make("Ldex/tests/order/A;");
        let mut v = vec![b, a];
        v.sort();
        assert_eq!(v, vec![a, b]);
    }

    #[test]
    fn test_proto_from_descriptor() {
        let proto = DexProto::from_descriptor("(IJLjava/lang/String;[D)V").unwrap();
        assert_eq!(proto.args().len(), 4);
        assert_eq!(proto.args().size_in_words(), 1 + 2 + 1 + 1);
        assert_eq!(proto.shorty().as_str(), "VIJLL");
        assert_eq!(proto.to_string(), "(IJLjava/lang/String;[D)V");
        assert!(proto.is_void());
        assert!(DexProto::from_descriptor("(I").is_err());
        assert!(DexProto::from_descriptor("(Q)V").is_err());
    }

    #[test]
    fn test_member_descriptors() {
        let f = DexFieldRef::make_from_descriptor("Ldex/tests/F;.count:I").unwrap();
        assert_eq!(f.class_type().as_str(), "Ldex/tests/F;");
        assert_eq!(f.name().as_str(), "count");
        assert_eq!(f.field_type(), type_util::int_type());
        let m = DexMethodRef::make_from_descriptor("Ldex/tests/F;.run:(J)Z").unwrap();
        assert_eq!(m.to_string(), "Ldex/tests/F;.run:(J)Z");
        assert!(DexMethodRef::make_from_descriptor("Ldex/tests/F;run").is_err());
    }

    #[test]
    fn test_field_promotion_is_monotonic() {
        let f = DexFieldRef::make_from_descriptor("Ldex/tests/P;.x:J").unwrap();
        assert!(!f.is_def());
        let def = f.make_concrete(ACC_PUBLIC | ACC_STATIC, Some(EncodedValue::Long(7)));
        assert!(f.is_def());
        let again = f.make_concrete(ACC_PRIVATE, None);
        assert_eq!(def, again);
        assert_eq!(again.access(), ACC_PUBLIC | ACC_STATIC);
        assert_eq!(again.static_value(), Some(EncodedValue::Long(7)));
    }

    #[test]
    fn test_method_promotion_rejects_virtual_mismatch() {
        let m = DexMethodRef::make_from_descriptor("Ldex/tests/P;.go:()V").unwrap();
        let def = m.make_concrete(ACC_PUBLIC, None, true).unwrap();
        assert!(def.is_virtual());
        assert!(m.make_concrete(ACC_PUBLIC, None, false).is_err());
        assert!(!def.has_code());
    }

    #[test]
    fn test_class_creation_and_duplicates() {
        let ty = DexType::make("Ldex/tests/Cls;");
        let m = DexMethodRef::make_from_descriptor("Ldex/tests/Cls;.<clinit>:()V")
            .unwrap()
            .make_concrete(ACC_STATIC | ACC_CONSTRUCTOR, None, false)
            .unwrap();
        let cls = ClassCreator::new(ty)
            .set_super(type_util::java_lang_object())
            .set_access(ACC_PUBLIC)
            .add_method(m)
            .create()
            .unwrap();
        assert_eq!(type_class(ty), Some(cls));
        assert_eq!(cls.clinit(), Some(m));
        assert!(ClassCreator::new(ty).create().is_err());
        assert!(cls.remove_method(m));
        assert!(cls.clinit().is_none());
    }

    #[test]
    fn test_virtual_resolution_walks_supers() {
        let base_ty = DexType::make("Ldex/tests/res/Base;");
        let sub_ty = DexType::make("Ldex/tests/res/Sub;");
        let foo = DexMethodRef::make_from_descriptor("Ldex/tests/res/Base;.foo:()V")
            .unwrap()
            .make_concrete(ACC_PUBLIC, None, true)
            .unwrap();
        ClassCreator::new(base_ty)
            .set_super(type_util::java_lang_object())
            .add_method(foo)
            .create()
            .unwrap();
        ClassCreator::new(sub_ty).set_super(base_ty).create().unwrap();

        let sub_ref = DexMethodRef::make_from_descriptor("Ldex/tests/res/Sub;.foo:()V").unwrap();
        assert_eq!(resolve_method(sub_ref, MethodSearch::Virtual, None), Some(foo));
        assert_eq!(resolve_method(sub_ref, MethodSearch::Direct, None), None);
        assert!(is_subclass(base_ty, sub_ty));
        assert_eq!(super_chain(sub_ty)[..2], [sub_ty, base_ty]);
    }

    #[test]
    fn test_hierarchy_children() {
        let root = DexType::make("Ldex/tests/h/Root;");
        let mid = DexType::make("Ldex/tests/h/Mid;");
        let leaf = DexType::make("Ldex/tests/h/Leaf;");
        let scope: Scope = vec![
            ClassCreator::new(root).create().unwrap(),
            ClassCreator::new(mid).set_super(root).create().unwrap(),
            ClassCreator::new(leaf).set_super(mid).create().unwrap(),
        ];
        let ch = ClassHierarchy::build(&scope);
        assert_eq!(ch.get_children(root).collect::<Vec<_>>(), vec![mid]);
        let all: Vec<_> = ch.get_all_children(root).into_iter().collect();
        assert_eq!(all, vec![leaf, mid]);
    }

    #[test]
    fn test_ordered_classes() {
        let z = ClassCreator::new(DexType::make("Ldex/tests/o/Z;")).create().unwrap();
        let a = ClassCreator::new(DexType::make("Ldex/tests/o/A;")).create().unwrap();
        let mut store = DexStore::new("classes");
        store.add_classes(vec![z, a]);
        let stores = vec![store];
        assert_eq!(ordered_classes(&stores, true), vec![z, a]);
        assert_eq!(ordered_classes(&stores, false), vec![a, z]);
    }

    #[test]
    fn test_access_flags_display() {
        let flags = ACC_PUBLIC | ACC_STATIC | ACC_FINAL;
        assert_eq!(flags.to_string(), "public static final");
        assert_eq!(DexAccessFlags::from_name("abstract"), Some(ACC_ABSTRACT));
        assert!(ACC_PRIVATE.is_private());
        assert!(DexAccessFlags::empty().is_package_private());
    }
}
