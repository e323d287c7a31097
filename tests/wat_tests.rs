#[cfg(test)]
mod tests {
    use rstest::rstest;
    use watmod::encoding::OP_END;
    use watmod::module::{Body, ExportFunc, FunctionType, NameAssoc, NameMapAssoc, ValueType};
    use watmod::wat::{self, BodyParser, LocalScope, ParseErrorKind, Token};

    fn sig(params: &[ValueType], results: &[ValueType]) -> FunctionType {
        FunctionType {
            params: params.to_vec(),
            results: results.to_vec(),
        }
    }

    #[test]
    fn exported_function() {
        let module = wat::parse(r#"(module (func $f (result i32)) (export "f" (func $f)))"#).unwrap();

        assert_eq!(module.types, vec![sig(&[], &[ValueType::I32])]);
        assert!(module.import_funcs.is_empty());
        assert_eq!(module.type_uses, vec![0]);
        assert_eq!(module.code.len(), 1);
        assert_eq!(module.code[0].body, vec![OP_END]);
        assert_eq!(
            module.export_funcs,
            vec![ExportFunc {
                name: "f".into(),
                func_index: 0
            }]
        );
        assert_eq!(module.function_name(0), Some("f"));
    }

    #[test]
    fn implicit_types_are_deduplicated_and_hoisted() {
        let module = wat::parse(
            r#"
            (module
                (func (param i32))
                (type $r (func (result i32)))
                (func (result i32))
                (func (param i32))
                (func (param i64)))
            "#,
        )
        .unwrap();

        assert_eq!(
            module.types,
            vec![
                sig(&[], &[ValueType::I32]),
                sig(&[ValueType::I32], &[]),
                sig(&[ValueType::I64], &[]),
            ]
        );
        assert_eq!(module.type_uses, vec![1, 0, 1, 2]);
    }

    #[test]
    fn forward_type_reference() {
        let module = wat::parse("(module (func (type $t)) (type $t (func (param i32))))").unwrap();
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.type_uses, vec![0]);
        assert_eq!(module.function_type(0), Some(&sig(&[ValueType::I32], &[])));
    }

    #[test]
    fn named_locals_with_forward_type_reference() {
        let module = wat::parse("(module (func (type $t) (local $x i32)) (type $t (func)))").unwrap();
        assert_eq!(module.type_uses, vec![0]);
        assert_eq!(module.code[0].locals, vec![ValueType::I32]);

        let module = wat::parse(
            r#"
            (module
                (func $f (type $bin) (local $x i32) (local $y f64)
                    local.get 0
                    local.set $y
                    local.get $x)
                (type $bin (func (param i32 i32) (result i32))))
            "#,
        )
        .unwrap();
        assert_eq!(
            module.code[0].body,
            vec![
                0x20, 0x00, // local.get 0
                0x21, 0x83, 0x80, 0x80, 0x80, 0x00, // local.set $y
                0x20, 0x82, 0x80, 0x80, 0x80, 0x00, // local.get $x
                OP_END,
            ]
        );
        let names = module.names.unwrap();
        assert_eq!(
            names.local_names,
            vec![NameMapAssoc {
                index: 0,
                name_map: vec![
                    NameAssoc {
                        index: 2,
                        name: "x".into()
                    },
                    NameAssoc {
                        index: 3,
                        name: "y".into()
                    },
                ]
            }]
        );
    }

    #[test]
    fn export_of_later_function() {
        let module = wat::parse(r#"(module (export "g" (func $g)) (func $f) (func $g))"#).unwrap();
        assert_eq!(
            module.export_funcs,
            vec![ExportFunc {
                name: "g".into(),
                func_index: 1
            }]
        );
    }

    #[test]
    fn imports_come_first_in_function_space() {
        let module = wat::parse(
            r#"
            (module $m
                (import "env" "log" (func $log (param $v i32)))
                (func $main (local $n i32)
                    local.get $n
                    call $log)
                (start $main))
            "#,
        )
        .unwrap();

        assert_eq!(module.function_count(), 2);
        assert_eq!(module.import_funcs[0].module, "env");
        assert_eq!(module.import_funcs[0].name, "log");
        assert_eq!(module.start_function, Some(1));
        // local.get 0, call 0 (padded), end
        assert_eq!(
            module.code[0].body,
            vec![0x20, 0x00, 0x10, 0x80, 0x80, 0x80, 0x80, 0x00, OP_END]
        );

        let names = module.names.unwrap();
        assert_eq!(names.module_name.as_deref(), Some("m"));
        assert_eq!(
            names.function_names,
            vec![
                NameAssoc {
                    index: 0,
                    name: "log".into()
                },
                NameAssoc {
                    index: 1,
                    name: "main".into()
                },
            ]
        );
        assert_eq!(
            names.local_names,
            vec![
                NameMapAssoc {
                    index: 0,
                    name_map: vec![NameAssoc {
                        index: 0,
                        name: "v".into()
                    }]
                },
                NameMapAssoc {
                    index: 1,
                    name_map: vec![NameAssoc {
                        index: 0,
                        name: "n".into()
                    }]
                },
            ]
        );
    }

    #[test]
    fn call_to_later_function() {
        let module = wat::parse("(module (func $a call $b) (func $b))").unwrap();
        assert_eq!(
            module.code[0].body,
            vec![0x10, 0x81, 0x80, 0x80, 0x80, 0x00, OP_END]
        );
    }

    #[test]
    fn json_output() {
        let module = wat::parse(r#"(module (func (result i32) i32.const 1) (export "one" (func 0)))"#).unwrap();
        let json: serde_json::Value = serde_json::to_value(&module).unwrap();
        assert_eq!(json["code"][0]["body"], "41010b");
        assert_eq!(json["export_funcs"][0]["name"], "one");
        assert_eq!(json["start_function"], serde_json::Value::Null);
    }

    #[rstest]
    #[case("", "1:1: missing module field")]
    #[case("(module", "1:8: unexpected end of input: unbalanced '(' in module")]
    #[case("(module (memory 1))", "1:10: unexpected field: memory in module")]
    #[case("(module (import))", "1:16: missing module and name in module.import[0]")]
    #[case(r#"(module (import "a"))"#, "1:20: missing name in module.import[0]")]
    #[case(r#"(module (export "a"))"#, "1:20: missing description field in module.export[0]")]
    #[case(
        r#"(module (export "a" (func 0)) (export "a" (func 0)))"#,
        r#"1:39: duplicate name "a" in module.export[1]"#
    )]
    #[case("(module (func) (import \"a\" \"b\" (func)))", "1:17: import after function in module")]
    #[case("(module (func $f) (func $f))", "1:25: duplicate identifier: $f in module.func[1]")]
    #[case("(module (func) (start 0) (start $nope))", "1:27: redundant start in module")]
    #[case("(module (start))", "1:15: missing index in module.start")]
    #[case("(module (start 0 1))", "1:18: redundant index: 1 in module.start")]
    #[case(r#"(module (export "x" (func 9)))"#, "1:27: unknown function: 9 in module.export[0].func")]
    #[case("(module (func $f) (start $g))", "1:26: unknown function: $g in module.start")]
    #[case("(module (func (type $t)))", "1:21: unknown type: $t in module.func[0]")]
    #[case("(module (func (type $t) (local $x i32)))", "1:21: unknown type: $t in module.func[0]")]
    #[case("(module (func (result f32) f32.const nan:0x800000))", "1:38: constant out of range: nan:0x800000 in module.func[0]")]
    fn diagnostics(#[case] source: &str, #[case] expected: &str) {
        let err = wat::parse(source).unwrap_err();
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn unresolved_export_is_a_bind_error() {
        let err = wat::parse(r#"(module (export "x" (func 9)))"#).unwrap_err();
        assert_eq!(err.context, "module.export[0].func");
        assert!(matches!(err.kind, ParseErrorKind::Unresolved { .. }));
    }

    /// Records the tokens it is given and emits an empty body.
    #[derive(Default)]
    struct TokenCounter {
        begun: usize,
        tokens: Vec<String>,
    }

    impl BodyParser for TokenCounter {
        fn begin(&mut self) {
            self.begun += 1;
        }

        fn feed(&mut self, token: &Token, _locals: &LocalScope) -> Result<(), ParseErrorKind> {
            self.tokens.push(token.kind.to_string());
            Ok(())
        }

        fn finish(&mut self) -> Result<Body, ParseErrorKind> {
            Ok(Body {
                code: vec![OP_END],
                ..Body::default()
            })
        }
    }

    #[test]
    fn custom_body_parser() {
        let mut counter = TokenCounter::default();
        let module = wat::parse_with("(module (func (local i32) (nop) drop) (func))", &mut counter).unwrap();

        assert_eq!(counter.begun, 2);
        assert_eq!(counter.tokens, vec!["(", "nop", ")", "drop"]);
        assert_eq!(module.code.len(), 2);
        assert_eq!(module.code[0].locals, vec![ValueType::I32]);
    }
}
