use thiserror::Error;

use crate::ast::{BinaryOperator, Expression, FunctionDefinition, Program, Statement};

/// System V AMD64 integer argument registers, in declaration order.
const ARG_REGISTERS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// Internal-consistency violations. Unreachable for parser-produced trees,
/// but never silently miscompiled.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum CodegenError {
    #[error("assignment target is not an addressable expression")]
    NotAddressable,
    #[error("more than six integer register arguments")]
    TooManyArguments,
}

/// Compile every function into one assembly text blob.
pub fn generate_program(program: &Program) -> Result<String, CodegenError> {
    let mut generator = CodeGenerator::default();
    generator.emit(".text");
    for function in &program.functions {
        generator.gen_function(function)?;
    }
    generator.emit(".section .note.GNU-stack,\"\",@progbits");
    Ok(generator.out)
}

/// Stack-machine emitter. Every expression leaves exactly one value on the
/// hardware stack; statements pop what their expression pushed. The label
/// counter lives here so separate compilations can never collide.
#[derive(Debug, Default)]
struct CodeGenerator {
    labels: u64,
    out: String,
}

impl CodeGenerator {
    fn emit(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn next_label(&mut self) -> u64 {
        self.labels += 1;
        self.labels
    }

    fn gen_function(&mut self, function: &FunctionDefinition) -> Result<(), CodegenError> {
        if function.params.len() > ARG_REGISTERS.len() {
            return Err(CodegenError::TooManyArguments);
        }

        self.emit(&format!(".globl {}", function.name));
        self.emit(&format!("{}:", function.name));

        self.emit("\tpush %rbp");
        self.emit("\tmov %rsp, %rbp");
        self.emit(&format!("\tsub ${}, %rsp", function.stack_size));

        for (i, &param) in function.params.iter().enumerate() {
            let offset = function.locals[param].offset;
            self.emit(&format!("\tmov {}, -{}(%rbp)", ARG_REGISTERS[i], offset));
        }

        for statement in &function.body {
            self.gen_statement(statement, function)?;
        }

        // Single epilogue; every return jumps here.
        self.emit(&format!(".L.return.{}:", function.name));
        self.emit("\tmov %rbp, %rsp");
        self.emit("\tpop %rbp");
        self.emit("\tret");
        Ok(())
    }

    fn gen_statement(
        &mut self,
        statement: &Statement,
        function: &FunctionDefinition,
    ) -> Result<(), CodegenError> {
        match statement {
            Statement::Expression(expr) => {
                self.gen_expression(expr, function)?;
                self.emit("\tpop %rax");
            }
            Statement::Return(expr) => {
                self.gen_expression(expr, function)?;
                self.emit("\tpop %rax");
                self.emit(&format!("\tjmp .L.return.{}", function.name));
            }
            Statement::If {
                condition,
                then,
                r#else,
            } => {
                let label = self.next_label();
                self.gen_expression(condition, function)?;
                self.emit("\tpop %rax");
                self.emit("\tcmp $0, %rax");
                match r#else {
                    Some(r#else) => {
                        self.emit(&format!("\tje .L.else.{label}"));
                        self.gen_statement(then, function)?;
                        self.emit(&format!("\tjmp .L.end.{label}"));
                        self.emit(&format!(".L.else.{label}:"));
                        self.gen_statement(r#else, function)?;
                        self.emit(&format!(".L.end.{label}:"));
                    }
                    None => {
                        self.emit(&format!("\tje .L.end.{label}"));
                        self.gen_statement(then, function)?;
                        self.emit(&format!(".L.end.{label}:"));
                    }
                }
            }
            Statement::While { condition, body } => {
                let label = self.next_label();
                self.emit(&format!(".L.begin.{label}:"));
                self.gen_expression(condition, function)?;
                self.emit("\tpop %rax");
                self.emit("\tcmp $0, %rax");
                self.emit(&format!("\tje .L.end.{label}"));
                self.gen_statement(body, function)?;
                self.emit(&format!("\tjmp .L.begin.{label}"));
                self.emit(&format!(".L.end.{label}:"));
            }
            Statement::For {
                init,
                condition,
                post,
                body,
            } => {
                let label = self.next_label();
                if let Some(init) = init {
                    self.gen_expression(init, function)?;
                    self.emit("\tpop %rax");
                }
                self.emit(&format!(".L.begin.{label}:"));
                // An absent condition loops unconditionally.
                if let Some(condition) = condition {
                    self.gen_expression(condition, function)?;
                    self.emit("\tpop %rax");
                    self.emit("\tcmp $0, %rax");
                    self.emit(&format!("\tje .L.end.{label}"));
                }
                self.gen_statement(body, function)?;
                if let Some(post) = post {
                    self.gen_expression(post, function)?;
                    self.emit("\tpop %rax");
                }
                self.emit(&format!("\tjmp .L.begin.{label}"));
                self.emit(&format!(".L.end.{label}:"));
            }
            Statement::Compound(statements) => {
                for statement in statements {
                    self.gen_statement(statement, function)?;
                }
            }
        }
        Ok(())
    }

    fn gen_expression(
        &mut self,
        expression: &Expression,
        function: &FunctionDefinition,
    ) -> Result<(), CodegenError> {
        match expression {
            Expression::Constant(value) => {
                self.emit(&format!("\tpush ${value}"));
            }
            Expression::Var(_) => {
                self.gen_address(expression, function)?;
                self.load();
            }
            Expression::Assignment { lhs, rhs } => {
                self.gen_address(lhs, function)?;
                self.gen_expression(rhs, function)?;
                // Assignment is an expression; the stored value stays pushed.
                self.emit("\tpop %rdi");
                self.emit("\tpop %rax");
                self.emit("\tmov %rdi, (%rax)");
                self.emit("\tpush %rdi");
            }
            Expression::AddressOf(operand) => {
                self.gen_address(operand, function)?;
            }
            Expression::Deref(operand) => {
                self.gen_expression(operand, function)?;
                self.load();
            }
            Expression::FunctionCall { name, args } => {
                if args.len() > ARG_REGISTERS.len() {
                    return Err(CodegenError::TooManyArguments);
                }
                for arg in args {
                    self.gen_expression(arg, function)?;
                }
                for reg in ARG_REGISTERS[..args.len()].iter().rev() {
                    self.emit(&format!("\tpop {reg}"));
                }
                // The ABI wants %rsp 16-byte aligned at the call and %rax
                // zeroed for the variadic register count. The pad is decided
                // at run time; enclosing temporaries make the depth dynamic.
                let label = self.next_label();
                self.emit("\tmov %rsp, %rax");
                self.emit("\tand $15, %rax");
                self.emit(&format!("\tjnz .L.call.{label}"));
                self.emit("\tmov $0, %rax");
                self.emit(&format!("\tcall {name}"));
                self.emit(&format!("\tjmp .L.end.{label}"));
                self.emit(&format!(".L.call.{label}:"));
                self.emit("\tsub $8, %rsp");
                self.emit("\tmov $0, %rax");
                self.emit(&format!("\tcall {name}"));
                self.emit("\tadd $8, %rsp");
                self.emit(&format!(".L.end.{label}:"));
                self.emit("\tpush %rax");
            }
            Expression::Binary { op, lhs, rhs } => {
                self.gen_expression(lhs, function)?;
                self.gen_expression(rhs, function)?;
                self.emit("\tpop %rdi");
                self.emit("\tpop %rax");
                match op {
                    BinaryOperator::Add => self.emit("\tadd %rdi, %rax"),
                    BinaryOperator::Subtract => self.emit("\tsub %rdi, %rax"),
                    BinaryOperator::Multiply => self.emit("\timul %rdi, %rax"),
                    BinaryOperator::Divide => {
                        self.emit("\tcqo");
                        self.emit("\tidiv %rdi");
                    }
                    BinaryOperator::Equal => self.compare("sete"),
                    BinaryOperator::NotEqual => self.compare("setne"),
                    BinaryOperator::LessThan => self.compare("setl"),
                    BinaryOperator::LessOrEqual => self.compare("setle"),
                }
                self.emit("\tpush %rax");
            }
        }
        Ok(())
    }

    /// Booleans are exactly 0 or 1: compare, set the flag byte, zero-extend.
    fn compare(&mut self, set: &str) {
        self.emit("\tcmp %rdi, %rax");
        self.emit(&format!("\t{set} %al"));
        self.emit("\tmovzbq %al, %rax");
    }

    /// Pop an address, push the 8-byte value it points at.
    fn load(&mut self) {
        self.emit("\tpop %rax");
        self.emit("\tmov (%rax), %rax");
        self.emit("\tpush %rax");
    }

    /// Push the address of an addressable expression: a variable's frame slot
    /// or whatever a dereferenced expression evaluates to.
    fn gen_address(
        &mut self,
        expression: &Expression,
        function: &FunctionDefinition,
    ) -> Result<(), CodegenError> {
        match expression {
            Expression::Var(index) => {
                let offset = function.locals[*index].offset;
                self.emit(&format!("\tlea -{offset}(%rbp), %rax"));
                self.emit("\tpush %rax");
            }
            Expression::Deref(operand) => self.gen_expression(operand, function)?,
            _ => return Err(CodegenError::NotAddressable),
        }
        Ok(())
    }
}
