pub mod builtins;
pub mod scope;
pub mod types;

use std::collections::HashMap;

use log::{debug, trace};

use crate::errors::{Diagnostics, Stage};
use crate::parser::ast::{
    AssignOp, BinaryOp, Block, Expr, ExprId, ExprKind, FunctionDecl, Location, Number, Program,
    Stmt, UnaryOp,
};
use scope::{Symbol, SymbolKind, SymbolTable};
use types::{common_type, is_compatible, BaseType, Type};

/// Resolved static type of every expression in a checked program.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    expr_types: HashMap<ExprId, Type>,
}

impl Analysis {
    pub fn type_of(&self, id: ExprId) -> Option<Type> {
        self.expr_types.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.expr_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expr_types.is_empty()
    }
}

/// Checks `program` and returns the expression types it resolved. Problems
/// are reported to `diagnostics` as `Stage::Semantic`.
pub fn analyze(program: &Program, diagnostics: &mut Diagnostics) -> Analysis {
    let mut analyzer = Analyzer::new();
    analyzer.analyze(program, diagnostics);
    analyzer.into_analysis()
}

#[derive(Debug, Clone)]
struct FunctionContext {
    return_type: Type,
}

#[derive(Debug)]
pub struct Analyzer {
    symbols: SymbolTable<Symbol>,
    function_stack: Vec<FunctionContext>,
    expr_types: HashMap<ExprId, Type>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        for builtin in builtins::BUILTINS {
            symbols.declare(
                builtin.name,
                Symbol::function(builtin.name, builtin.ret, builtin.params.to_vec()),
            );
        }

        Self {
            symbols,
            function_stack: Vec::new(),
            expr_types: HashMap::new(),
        }
    }

    /// Returns true when the program produced no semantic diagnostics.
    pub fn analyze(&mut self, program: &Program, diagnostics: &mut Diagnostics) -> bool {
        let before = diagnostics.errors(Stage::Semantic).len();

        for function in &program.functions {
            self.declare_function(function, diagnostics);
        }
        for function in &program.functions {
            self.check_function(function, diagnostics);
        }

        let found = diagnostics.errors(Stage::Semantic).len() - before;
        debug!(
            "analyzed {} functions, {} semantic errors",
            program.functions.len(),
            found
        );
        found == 0
    }

    pub fn into_analysis(self) -> Analysis {
        Analysis {
            expr_types: self.expr_types,
        }
    }

    fn declare_function(&mut self, function: &FunctionDecl, diagnostics: &mut Diagnostics) {
        let params = function.params.iter().map(|param| param.ty).collect();
        let symbol = Symbol::function(&function.name, function.return_type, params);
        if builtins::is_reserved(&function.name) || !self.symbols.declare(&function.name, symbol) {
            report(
                diagnostics,
                function.loc,
                format!("Function '{}' is already declared", function.name),
            );
        }

        if function.name == "main" {
            check_main_signature(function, diagnostics);
        }
    }

    fn check_function(&mut self, function: &FunctionDecl, diagnostics: &mut Diagnostics) {
        trace!("checking function '{}'", function.name);
        self.symbols.push_scope();
        self.function_stack.push(FunctionContext {
            return_type: function.return_type,
        });

        for param in &function.params {
            if param.ty.is_void() {
                report(
                    diagnostics,
                    param.loc,
                    format!("Parameter '{}' cannot have type void", param.name),
                );
            }
            if !self
                .symbols
                .declare(&param.name, Symbol::variable(&param.name, param.ty))
            {
                report(
                    diagnostics,
                    param.loc,
                    format!("Parameter '{}' is already declared", param.name),
                );
            }
        }

        // Parameters and top-level body statements share one scope.
        for stmt in &function.body.statements {
            self.check_statement(stmt, diagnostics);
        }

        self.function_stack.pop();
        self.symbols.pop_scope();
    }

    fn check_block(&mut self, block: &Block, diagnostics: &mut Diagnostics) {
        self.symbols.push_scope();
        for stmt in &block.statements {
            self.check_statement(stmt, diagnostics);
        }
        self.symbols.pop_scope();
    }

    fn check_statement(&mut self, statement: &Stmt, diagnostics: &mut Diagnostics) {
        match statement {
            Stmt::VarDecl {
                name,
                ty,
                initializer,
                loc,
            } => {
                if ty.is_void() {
                    report(
                        diagnostics,
                        *loc,
                        format!("Variable '{}' cannot have type void", name),
                    );
                }
                if let Some(init) = initializer {
                    self.check_assignable(
                        *ty,
                        init,
                        "Type mismatch in variable declaration",
                        diagnostics,
                    );
                }
                if !self.symbols.declare(name, Symbol::variable(name, *ty)) {
                    report(
                        diagnostics,
                        *loc,
                        format!("Variable already declared in this scope: '{}'", name),
                    );
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_condition(
                    condition,
                    "If condition must evaluate to a boolean value",
                    diagnostics,
                );
                self.check_branch(then_branch, diagnostics);
                if let Some(else_branch) = else_branch {
                    self.check_branch(else_branch, diagnostics);
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                self.check_condition(
                    condition,
                    "While condition must evaluate to a boolean value",
                    diagnostics,
                );
                self.check_branch(body, diagnostics);
            }
            Stmt::Return { value, loc } => self.check_return(value.as_ref(), *loc, diagnostics),
            Stmt::Expr(expr) => {
                let _ = self.infer_expr(expr, diagnostics);
            }
            Stmt::Block(block) => self.check_block(block, diagnostics),
        }
    }

    fn check_branch(&mut self, branch: &Stmt, diagnostics: &mut Diagnostics) {
        self.symbols.push_scope();
        self.check_statement(branch, diagnostics);
        self.symbols.pop_scope();
    }

    fn check_condition(&mut self, condition: &Expr, message: &str, diagnostics: &mut Diagnostics) {
        let ty = self.infer_expr(condition, diagnostics);
        if ty.is_bool() || ty.is_error() || is_boolean_shaped(condition) {
            return;
        }
        report(
            diagnostics,
            condition.loc,
            format!("{}, found {}", message, ty),
        );
    }

    fn check_return(&mut self, value: Option<&Expr>, loc: Location, diagnostics: &mut Diagnostics) {
        let Some(expected) = self.function_stack.last().map(|ctx| ctx.return_type) else {
            report(diagnostics, loc, "Return outside of a function");
            return;
        };

        match value {
            None if !expected.is_void() => report(
                diagnostics,
                loc,
                format!("Return type mismatch: expected {}, found void", expected),
            ),
            None => {}
            Some(expr) if expected.is_void() => {
                let _ = self.infer_expr(expr, diagnostics);
                report(
                    diagnostics,
                    expr.loc,
                    "Return type mismatch: void function cannot return a value",
                );
            }
            Some(expr) => {
                self.check_assignable(expected, expr, "Return type mismatch", diagnostics)
            }
        }
    }

    /// Checks that `expr` can be stored into a slot of type `target`. Array
    /// literals are checked element by element against the target's element
    /// type so that `{1, 2}` fills a `float[]`.
    fn check_assignable(
        &mut self,
        target: Type,
        expr: &Expr,
        context: &str,
        diagnostics: &mut Diagnostics,
    ) {
        if let ExprKind::ArrayLiteral(elements) = &expr.kind {
            if target.is_array() && target.base != BaseType::Any && !target.is_error() {
                let element_type = target.element();
                for element in elements {
                    let found = self.infer_expr(element, diagnostics);
                    if !is_compatible(&element_type, &found) {
                        report(
                            diagnostics,
                            element.loc,
                            format!("{}: expected {}, found {}", context, element_type, found),
                        );
                    }
                }

                if let Some(len) = target.fixed_len() {
                    if elements.len() > len {
                        report(
                            diagnostics,
                            expr.loc,
                            format!(
                                "Array literal has {} elements but {} holds {}",
                                elements.len(),
                                target,
                                len
                            ),
                        );
                    }
                }

                self.record(expr, Type::fixed(target.base, elements.len()));
                return;
            }
        }

        let found = self.infer_expr(expr, diagnostics);
        if !is_compatible(&target, &found) {
            report(
                diagnostics,
                expr.loc,
                format!("{}: expected {}, found {}", context, target, found),
            );
        }
    }

    fn infer_expr(&mut self, expr: &Expr, diagnostics: &mut Diagnostics) -> Type {
        let ty = match &expr.kind {
            ExprKind::Number(Number::Int(_)) => Type::INT,
            ExprKind::Number(Number::Float(_)) => Type::FLOAT,
            ExprKind::String(_) => Type::STR,
            ExprKind::Bool(_) => Type::BOOL,
            ExprKind::Variable(name) => match self.symbols.resolve(name) {
                Some(symbol) if symbol.is_function() => {
                    report(
                        diagnostics,
                        expr.loc,
                        format!("'{}' is a function, not a variable", name),
                    );
                    Type::ERROR
                }
                Some(symbol) => symbol.ty,
                None => {
                    report(
                        diagnostics,
                        expr.loc,
                        format!("Undefined variable '{}'", name),
                    );
                    Type::ERROR
                }
            },
            ExprKind::ArrayAccess { array, index } => {
                let array_type = self.infer_expr(array, diagnostics);
                let index_type = self.infer_expr(index, diagnostics);

                if !(index_type == Type::INT || index_type.is_error()) {
                    report(
                        diagnostics,
                        index.loc,
                        format!("Array index must be an integer, found {}", index_type),
                    );
                }

                if array_type.is_error() {
                    Type::ERROR
                } else if !array_type.is_array() {
                    report(
                        diagnostics,
                        array.loc,
                        format!("Cannot index a value of type {}", array_type),
                    );
                    Type::ERROR
                } else if array_type.base == BaseType::Any {
                    report(
                        diagnostics,
                        array.loc,
                        "Cannot index an untyped allocation; assign it to a typed array first",
                    );
                    Type::ERROR
                } else {
                    array_type.element()
                }
            }
            ExprKind::Binary { lhs, op, rhs } => {
                let lhs_type = self.infer_expr(lhs, diagnostics);
                let rhs_type = self.infer_expr(rhs, diagnostics);
                check_binary(*op, lhs_type, rhs_type, expr.loc, diagnostics)
            }
            ExprKind::Unary { op, operand } => {
                let operand_type = self.infer_expr(operand, diagnostics);
                match op {
                    UnaryOp::Negate => {
                        if operand_type.is_numeric() || operand_type.is_error() {
                            operand_type
                        } else {
                            report(
                                diagnostics,
                                expr.loc,
                                format!("Unary '-' requires numeric operand, found {}", operand_type),
                            );
                            Type::ERROR
                        }
                    }
                    UnaryOp::Not => {
                        if !(operand_type.is_bool() || operand_type.is_error()) {
                            report(
                                diagnostics,
                                expr.loc,
                                format!("'!' requires boolean operand, found {}", operand_type),
                            );
                        }
                        Type::BOOL
                    }
                }
            }
            ExprKind::Assign { target, op, value } => {
                let target_type = self.infer_expr(target, diagnostics);
                match op {
                    AssignOp::Assign => self.check_assignable(
                        target_type,
                        value,
                        "Type mismatch in assignment",
                        diagnostics,
                    ),
                    _ => {
                        let value_type = self.infer_expr(value, diagnostics);
                        let numeric = (target_type.is_numeric() || target_type.is_error())
                            && (value_type.is_numeric() || value_type.is_error());
                        if !numeric {
                            report(
                                diagnostics,
                                expr.loc,
                                format!(
                                    "Compound assignment requires numeric operands, found {} and {}",
                                    target_type, value_type
                                ),
                            );
                        } else if !is_compatible(&target_type, &value_type) {
                            report(
                                diagnostics,
                                expr.loc,
                                format!(
                                    "Type mismatch in assignment: expected {}, found {}",
                                    target_type, value_type
                                ),
                            );
                        }
                    }
                }
                target_type
            }
            ExprKind::Call { callee, args } => self.check_call(expr, callee, args, diagnostics),
            ExprKind::ArrayLiteral(elements) => self.infer_array_literal(elements, diagnostics),
            ExprKind::ArrayAlloc { elem, size } => {
                let size_type = self.infer_expr(size, diagnostics);
                if !(size_type == Type::INT || size_type.is_error()) {
                    report(
                        diagnostics,
                        size.loc,
                        format!("Array size must be an integer, found {}", size_type),
                    );
                }
                if elem.is_void() {
                    report(diagnostics, expr.loc, "Cannot allocate an array of void");
                    Type::ERROR
                } else {
                    Type::dynamic(elem.base)
                }
            }
            ExprKind::TypeRef(ty) => {
                report(
                    diagnostics,
                    expr.loc,
                    format!("Type '{}' used as a value; only sizeof accepts a type", ty),
                );
                Type::ERROR
            }
        };

        self.record(expr, ty);
        ty
    }

    fn infer_array_literal(&mut self, elements: &[Expr], diagnostics: &mut Diagnostics) -> Type {
        let mut common: Option<Type> = None;
        for element in elements {
            let found = self.infer_expr(element, diagnostics);
            if found.is_array() {
                report(
                    diagnostics,
                    element.loc,
                    "Array elements must be scalar values",
                );
                continue;
            }
            common = Some(match common {
                None => found,
                Some(current) if is_compatible(&current, &found) || is_compatible(&found, &current) => {
                    common_type(&current, &found)
                }
                Some(current) => {
                    report(
                        diagnostics,
                        element.loc,
                        format!(
                            "Array elements must have compatible types: {} and {}",
                            current, found
                        ),
                    );
                    current
                }
            });
        }

        let base = common.map(|ty| ty.base).unwrap_or(BaseType::Any);
        Type::fixed(base, elements.len())
    }

    fn check_call(
        &mut self,
        expr: &Expr,
        callee: &str,
        args: &[Expr],
        diagnostics: &mut Diagnostics,
    ) -> Type {
        let symbol = self.symbols.resolve(callee).cloned();
        let known = symbol.is_some();
        let Some(Symbol {
            ty: ret,
            kind: SymbolKind::Function { params },
            ..
        }) = symbol
        else {
            let message = if known {
                format!("'{}' is not a function", callee)
            } else {
                format!("Undefined function '{}'", callee)
            };
            report(diagnostics, expr.loc, message);
            for arg in args {
                let _ = self.infer_expr(arg, diagnostics);
            }
            return Type::ERROR;
        };

        if args.len() != params.len() {
            report(
                diagnostics,
                expr.loc,
                format!(
                    "Wrong number of arguments: '{}' expects {}, found {}",
                    callee,
                    params.len(),
                    args.len()
                ),
            );
            for arg in args {
                let _ = self.infer_expr(arg, diagnostics);
            }
            return ret;
        }

        let is_builtin = builtins::lookup(callee).is_some();
        match (is_builtin, callee) {
            (true, "sizeof") => {
                let arg = &args[0];
                if let ExprKind::TypeRef(ty) = &arg.kind {
                    if ty.is_void() {
                        report(diagnostics, arg.loc, "sizeof(void) is not defined");
                    }
                    self.record(arg, *ty);
                } else {
                    let _ = self.infer_expr(arg, diagnostics);
                    report(diagnostics, arg.loc, "sizeof expects a type such as int or float[4]");
                }
                return ret;
            }
            (true, "print") => {
                let arg = &args[0];
                let found = self.infer_expr(arg, diagnostics);
                let printable = found.is_error()
                    || (found.is_scalar()
                        && matches!(
                            found.base,
                            BaseType::Int | BaseType::Float | BaseType::Bool | BaseType::Str
                        ));
                if !printable {
                    report(
                        diagnostics,
                        arg.loc,
                        format!("print expects an int, float, bool or str value, found {}", found),
                    );
                }
                return ret;
            }
            _ => {}
        }

        for (arg, param) in args.iter().zip(params.iter()) {
            self.check_assignable(*param, arg, "Argument type mismatch", diagnostics);
        }
        ret
    }

    fn record(&mut self, expr: &Expr, ty: Type) {
        self.expr_types.insert(expr.id, ty);
    }
}

fn check_binary(
    op: BinaryOp,
    lhs: Type,
    rhs: Type,
    loc: Location,
    diagnostics: &mut Diagnostics,
) -> Type {
    let poisoned = lhs.is_error() || rhs.is_error();

    if op.is_arithmetic() {
        if poisoned {
            return Type::ERROR;
        }
        if lhs.is_numeric() && rhs.is_numeric() {
            return common_type(&lhs, &rhs);
        }
        report(
            diagnostics,
            loc,
            format!(
                "Invalid operand types for '{}': {} and {}",
                op.symbol(),
                lhs,
                rhs
            ),
        );
        return Type::ERROR;
    }

    let valid = poisoned
        || if op.is_relational() {
            lhs.is_numeric() && rhs.is_numeric()
        } else if op.is_equality() {
            !lhs.is_void()
                && !rhs.is_void()
                && (is_compatible(&lhs, &rhs) || is_compatible(&rhs, &lhs))
        } else {
            lhs.is_bool() && rhs.is_bool()
        };

    if !valid {
        let message = if op.is_logical() {
            format!(
                "'{}' requires boolean operands, found {} and {}",
                op.symbol(),
                lhs,
                rhs
            )
        } else {
            format!(
                "Invalid operand types for '{}': {} and {}",
                op.symbol(),
                lhs,
                rhs
            )
        };
        report(diagnostics, loc, message);
    }
    Type::BOOL
}

fn check_main_signature(function: &FunctionDecl, diagnostics: &mut Diagnostics) {
    if function.return_type != Type::INT {
        report(
            diagnostics,
            function.loc,
            format!(
                "Main function must return int, found {}",
                function.return_type
            ),
        );
        return;
    }

    let params: Vec<Type> = function.params.iter().map(|param| param.ty).collect();
    let valid = match params.as_slice() {
        [] => true,
        [count, args] => {
            *count == Type::INT && args.is_array() && args.base == BaseType::Str
        }
        _ => false,
    };
    if !valid {
        let found = params
            .iter()
            .map(|ty| ty.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        report(
            diagnostics,
            function.loc,
            format!(
                "Invalid main signature: expected main() or main(int, str[]), found main({})",
                found
            ),
        );
    }
}

/// Comparisons, logical operators and `!` count as conditions even when an
/// operand failed to type-check.
fn is_boolean_shaped(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Binary { op, .. } => !op.is_arithmetic(),
        ExprKind::Unary {
            op: UnaryOp::Not, ..
        } => true,
        _ => false,
    }
}

fn report(diagnostics: &mut Diagnostics, loc: Location, message: impl Into<String>) {
    diagnostics.report(Stage::Semantic, loc.line, loc.column, message);
}
